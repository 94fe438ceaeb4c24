pub mod config_loader;
pub mod deployer;
pub mod git;
pub mod matcher;
pub mod pm2;
pub mod ports;
pub mod queue;
pub mod router;
pub mod shell;
pub mod store;
pub mod supervisor;
pub mod template;
pub mod tmux;
