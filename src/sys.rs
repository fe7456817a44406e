pub mod ax;
pub mod geometry;
pub mod notify;
pub mod window_server;

#[cfg(test)]
pub mod testing;
