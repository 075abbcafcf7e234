pub mod control;
pub mod init;
pub mod migrate;
