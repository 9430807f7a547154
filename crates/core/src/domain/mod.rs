pub mod constituent;
pub mod screen;
