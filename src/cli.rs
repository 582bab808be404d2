//! Interface de linha de comando baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (worker, upload,
//! create-table) e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Contagem distribuída de palavras sobre arquivos enviados ao S3.
#[derive(Debug, Parser)]
#[command(name = "wordfreq", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Arquivo de configuração TOML (padrão: ./wordfreq.toml, se existir).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Processa jobs da fila até receber Ctrl+C.
    Worker,

    /// Envia um arquivo ao bucket e aguarda o resultado do job.
    Upload {
        /// Bucket de destino.
        bucket: String,

        /// Arquivo local a enviar; a chave é o nome base do arquivo.
        file: PathBuf,

        /// Retorna logo após o upload, sem aguardar o resultado.
        #[arg(long, default_value_t = false)]
        no_wait: bool,
    },

    /// Cria a tabela DynamoDB de resultados.
    CreateTable {
        /// Nome da tabela.
        table: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_worker_subcommand() {
        let cli = Cli::parse_from(["wordfreq", "worker"]);
        assert!(matches!(cli.command, Command::Worker));
        assert!(cli.config.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn cli_parses_upload_subcommand() {
        let cli = Cli::parse_from(["wordfreq", "upload", "books", "./story.txt", "--no-wait"]);
        match cli.command {
            Command::Upload {
                bucket,
                file,
                no_wait,
            } => {
                assert_eq!(bucket, "books");
                assert_eq!(file, PathBuf::from("./story.txt"));
                assert!(no_wait);
            }
            _ => panic!("expected Upload command"),
        }
    }

    #[test]
    fn cli_parses_create_table_and_global_flags() {
        let cli = Cli::parse_from([
            "wordfreq",
            "--config",
            "/etc/wordfreq.toml",
            "--verbose",
            "create-table",
            "results",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/wordfreq.toml")));
        match cli.command {
            Command::CreateTable { table } => assert_eq!(table, "results"),
            _ => panic!("expected CreateTable command"),
        }
    }

    #[test]
    fn upload_requires_bucket_and_file() {
        assert!(Cli::try_parse_from(["wordfreq", "upload", "books"]).is_err());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
