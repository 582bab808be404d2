//! Interface de terminal do cliente de upload: spinner e saída colorida.
//!
//! Usa `indicatif` para o spinner enquanto o resultado é aguardado e
//! `console` para estilizar a tabela de palavras.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::job::JobStatus;
use crate::notifier::ResultMessage;

/// Spinner exibido enquanto o cliente espera o resultado do job.
pub struct ResultWait {
    pb: ProgressBar,
}

impl ResultWait {
    pub fn start(filename: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} {elapsed}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Waiting for results of {filename}"));
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    pub fn finish(self) {
        self.pb.finish_and_clear();
    }
}

/// Formata a duração com precisão proporcional ao seu tamanho.
///
/// Acima de um minuto trunca para segundos, acima de um segundo para
/// milissegundos, acima de um milissegundo para microssegundos.
pub fn format_duration(d: Duration) -> String {
    let truncated = if d > Duration::from_secs(60) {
        Duration::from_secs(d.as_secs())
    } else if d > Duration::from_secs(1) {
        Duration::from_millis(d.as_millis() as u64)
    } else if d > Duration::from_millis(1) {
        Duration::from_micros(d.as_micros() as u64)
    } else {
        d
    };
    format!("{truncated:?}")
}

/// Renderiza o resultado recebido da fila de resultados.
pub fn render_result(result: &ResultMessage) -> String {
    let mut out = format!(
        "Job Results completed in {} for {}/{}\n",
        format_duration(result.duration()),
        result.job.bucket,
        result.job.key
    );

    if result.status == JobStatus::Failure {
        let red = Style::new().red().bold();
        out.push_str(&format!("{} {}\n", red.apply_to("Failed:"), result.status_message));
        return out;
    }

    let bold = Style::new().bold();
    let width = result
        .words
        .iter()
        .map(|w| w.text.chars().count())
        .max()
        .unwrap_or(4)
        .max(4);
    out.push_str(&format!("{}\n", bold.apply_to(format!("{:<width$}  {:>6}", "Word", "Count"))));
    for word in &result.words {
        out.push_str(&format!("{:<width$}  {:>6}\n", word.text, word.count));
    }
    out
}

pub fn print_result(result: &ResultMessage) {
    print!("{}", render_result(result));
}
