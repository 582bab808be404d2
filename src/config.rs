//! Configuração do worker carregada de `wordfreq.toml` e do ambiente.
//!
//! A struct [`WorkerConfig`] contém todos os parâmetros configuráveis.
//! Valores ausentes no arquivo usam defaults sensíveis; variáveis de
//! ambiente têm precedência sobre o arquivo. A configuração é validada uma
//! única vez na inicialização e não muda depois disso.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::pipeline::PipelineSettings;
use crate::queue::RECEIVE_BACKOFF;
use crate::worker::default_worker_count;

/// Arquivo lido quando nenhum caminho é informado.
pub const DEFAULT_CONFIG_FILE: &str = "wordfreq.toml";

/// Configuração de nível superior do worker.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// URL da fila SQS de onde as mensagens de job são lidas.
    #[serde(default)]
    pub worker_queue_url: String,

    /// URL da fila SQS para onde os resultados são enviados.
    #[serde(default)]
    pub result_queue_url: String,

    /// Nome da tabela DynamoDB onde os resultados são gravados.
    #[serde(default)]
    pub result_table_name: String,

    /// Número de workers no pool.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Segundos em que uma mensagem lida fica invisível para outros leitores.
    /// Também é o valor usado ao estender jobs longos.
    #[serde(default = "default_message_visibility")]
    pub message_visibility: u64,

    /// Tempo máximo de long polling de cada receive, em segundos.
    #[serde(default = "default_queue_wait")]
    pub queue_wait: u64,

    /// Região AWS. Quando ausente, é descoberta via metadados da instância EC2.
    #[serde(default)]
    pub region: Option<String>,
}

// Valor padrão da visibilidade das mensagens: 60s.
fn default_message_visibility() -> u64 {
    60
}

// Valor padrão do long polling: 20s, o máximo aceito pelo SQS.
fn default_queue_wait() -> u64 {
    20
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_queue_url: String::new(),
            result_queue_url: String::new(),
            result_table_name: String::new(),
            worker_count: default_worker_count(),
            message_visibility: default_message_visibility(),
            queue_wait: default_queue_wait(),
            region: None,
        }
    }
}

fn parse_positive(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}

impl WorkerConfig {
    /// Carrega o arquivo (se existir) e aplica as variáveis de ambiente do
    /// processo. Não valida; veja [`validate`](Self::validate).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Lê a configuração de `path`, ou de [`DEFAULT_CONFIG_FILE`] se ele
    /// existir. Um caminho explícito que não existe é erro.
    pub fn from_file(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str::<WorkerConfig>(&contents)?)
    }

    /// Sobrescreve campos com as variáveis de ambiente encontradas por
    /// `lookup`. Variáveis vazias são ignoradas.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = var("WORKER_QUEUE_URL") {
            self.worker_queue_url = v;
        }
        if let Some(v) = var("WORKER_RESULT_QUEUE_URL") {
            self.result_queue_url = v;
        }
        if let Some(v) = var("WORKER_RESULT_TABLENAME") {
            self.result_table_name = v;
        }
        if let Some(v) = var("WORKER_MESSAGE_VISIBILITY") {
            self.message_visibility = parse_positive("WORKER_MESSAGE_VISIBILITY", &v)?;
        }
        if let Some(v) = var("WORKER_COUNT") {
            self.worker_count = parse_positive("WORKER_COUNT", &v)? as usize;
        }
        if let Some(v) = var("WORKER_QUEUE_WAIT") {
            self.queue_wait = v.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "WORKER_QUEUE_WAIT",
                value: v.clone(),
            })?;
        }
        if let Some(v) = var("AWS_REGION") {
            self.region = Some(v);
        }
        Ok(())
    }

    /// Confere tudo o que o worker precisa para iniciar.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_queue_url.is_empty() {
            return Err(ConfigError::Missing("WORKER_QUEUE_URL"));
        }
        if self.result_queue_url.is_empty() {
            return Err(ConfigError::Missing("WORKER_RESULT_QUEUE_URL"));
        }
        if self.result_table_name.is_empty() {
            return Err(ConfigError::Missing("WORKER_RESULT_TABLENAME"));
        }
        if self.message_visibility == 0 {
            return Err(ConfigError::Invalid {
                name: "WORKER_MESSAGE_VISIBILITY",
                value: "0".into(),
            });
        }
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid {
                name: "WORKER_COUNT",
                value: "0".into(),
            });
        }
        if self.queue_wait > 20 {
            return Err(ConfigError::Invalid {
                name: "WORKER_QUEUE_WAIT",
                value: self.queue_wait.to_string(),
            });
        }
        Ok(())
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.message_visibility)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            worker_count: self.worker_count,
            receive_wait: Duration::from_secs(self.queue_wait),
            receive_backoff: RECEIVE_BACKOFF,
        }
    }
}
