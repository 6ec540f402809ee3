pub mod ttf;
