pub mod overtime;
