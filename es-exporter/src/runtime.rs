use clap::Parser;
use thiserror::Error;

use crate::runtime::{
    cli::Cli,
    conf::{Conf, ConfError},
};

pub mod cli;
pub mod conf;
pub mod logging;

pub struct Runtime {
    pub cli: Cli,
    pub conf: Conf,
}

impl Runtime {
    pub fn new() -> Result<Self, RuntimeError> {
        let cli = Cli::parse();
        let (conf, cli) = Conf::new(cli)?;

        Ok(Runtime { cli, conf })
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Conf(#[from] ConfError),
}
