use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Motor batch por chunks con metadatos reiniciables.
#[derive(Parser, Debug)]
#[command(name = "batchflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Lanza un job (importUserJob | helloJob)
    Launch {
        job: String,

        /// Parámetro `nombre[(tipo)]=valor`; prefijo `-` = no identificador
        #[arg(short, long = "param", value_name = "NAME=VALUE", allow_hyphen_values = true)]
        params: Vec<String>,

        /// Archivo de entrada de importUserJob
        #[arg(long)]
        input: Option<PathBuf>,

        #[arg(long)]
        chunk_size: Option<usize>,

        #[arg(long)]
        skip_limit: Option<u32>,

        /// Lanza en un hilo dedicado y espera su fin sondeando el repositorio
        #[arg(long = "async")]
        async_mode: bool,

        /// Nueva instancia a partir de la última ejecución (run.id + 1)
        #[arg(long)]
        next: bool,
    },

    /// Muestra una ejecución y sus steps
    Status { execution: Uuid },

    /// Solicita el stop de una ejecución en curso
    Stop { execution: Uuid },

    /// Marca una ejecución FAILED/STOPPED como ABANDONED
    Abandon { execution: Uuid },

    /// Lista los jobs disponibles
    Jobs,
}
