pub mod manager;
pub mod state;

pub use manager::{ ChatHandle, ConnectionManager, ManagerConfig };
pub use state::{ ConnectionState, RetryCounter };
