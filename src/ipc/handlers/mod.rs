pub mod attendance;
pub mod core;
pub mod fees;
pub mod leave;
pub mod marks;
pub mod setup;
pub mod students;
pub mod summary;
