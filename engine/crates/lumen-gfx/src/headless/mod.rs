pub mod headless_backend;
