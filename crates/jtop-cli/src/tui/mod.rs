pub mod app;
pub mod pages;
pub mod terminal;
pub mod ui;
