use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::PrinterConfig;
use crate::models::{compare_urls, Link, OutputFormat};
use crate::pool::panic_message;
use crate::visited::VisitedSet;

const STATUS_OK: u16 = 200;
const FALLBACK_MSG: &str = "error generating file, printing results to console";

const HTML_REPORT_NAME: &str = "links.html";
const CSV_REPORT_NAME: &str = "links.csv";

/// Result consumer for the pipeline.
///
/// In streaming mode each record is printed as soon as it arrives. Sorted
/// output, occurrence display, and file reports all require the complete
/// crawl, so those configurations defer everything until the inspection side
/// signals completion and then render a snapshot of the visited set.
pub struct Printer {
    cfg: PrinterConfig,
    format: OutputFormat,
    visited: Arc<VisitedSet>,
}

impl Printer {
    pub fn new(cfg: PrinterConfig, visited: Arc<VisitedSet>) -> Self {
        // The format string was validated with the rest of the config.
        let format = OutputFormat::parse(&cfg.output_format).unwrap_or_default();
        Self {
            cfg,
            format,
            visited,
        }
    }

    /// Spawn the print loop. Sends on `done_printing` once output is flushed;
    /// the application blocks on that channel before exiting.
    pub fn spawn(
        self,
        mut to_print: mpsc::Receiver<Link>,
        mut done_inspecting: mpsc::Receiver<()>,
        done_printing: mpsc::Sender<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(link) = to_print.recv() => self.print_one(&link),

                    _ = done_inspecting.recv() => {
                        // Drain records that were still buffered when the
                        // completion signal arrived.
                        while let Ok(link) = to_print.try_recv() {
                            self.print_one(&link);
                        }

                        self.finalize();
                        let _ = done_printing.send(()).await;
                        return;
                    }
                }
            }
        })
    }

    fn deferred(&self) -> bool {
        self.cfg.sort_output || self.cfg.display_occurrences || self.format.is_file()
    }

    fn print_one(&self, link: &Link) {
        if self.deferred() || (self.cfg.skip_ok && link.status.code() == STATUS_OK) {
            return;
        }

        println!("{}", format_line(link));
    }

    /// Deferred-mode rendering over the finalized visited set. File output
    /// falls back to the console on any error or panic in the report writer.
    fn finalize(&self) {
        if !self.deferred() {
            return;
        }

        let mut links = self.visited.snapshot();
        if self.cfg.sort_output {
            links.sort_by(|a, b| compare_urls(&a.url, &b.url));
        }
        if self.cfg.skip_ok {
            links.retain(|link| link.status.code() != STATUS_OK);
        }

        if self.format.is_file() {
            match catch_unwind(AssertUnwindSafe(|| self.generate_file(&links))) {
                Ok(Ok(path)) => {
                    println!("generated report: {}", path.display());
                    if !self.cfg.do_not_open_file_report {
                        if let Err(e) = open_report(&path) {
                            tracing::warn!("cannot open generated report: {e}");
                        }
                    }
                    return;
                }
                Ok(Err(e)) => println!("{FALLBACK_MSG} {e}"),
                Err(payload) => println!("{FALLBACK_MSG} {}", panic_message(payload)),
            }

            for link in &links {
                println!("{}", format_line(link));
            }
        } else if self.cfg.display_occurrences {
            for link in &links {
                println!(
                    "{} - {} - {}",
                    link.status.label(),
                    u16::from(link.occurrences) + 1,
                    link.url
                );
            }
        } else {
            for link in &links {
                println!("{}", format_line(link));
            }
        }
    }

    fn generate_file(&self, links: &[Link]) -> Result<PathBuf, PrintError> {
        let dir = std::env::temp_dir();
        match self.format {
            OutputFormat::Html => write_html_report(&dir, links),
            OutputFormat::Csv => write_csv_report(&dir, links),
            OutputFormat::Stdout => Err(PrintError::NotAFileFormat),
        }
    }
}

pub fn format_line(link: &Link) -> String {
    format!("{} - {}", link.status.label(), link.url)
}

#[derive(Debug, thiserror::Error)]
pub enum PrintError {
    #[error("report io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("output format does not produce a file")]
    NotAFileFormat,
}

/// Write `links.csv` into `dir`: header row plus one row per record, with
/// the occurrence counter shifted to the actual reference count.
pub fn write_csv_report(dir: &Path, links: &[Link]) -> Result<PathBuf, PrintError> {
    let path = dir.join(CSV_REPORT_NAME);
    let mut writer = csv::Writer::from_path(&path)?;

    writer.write_record(["Status", "Occurrences", "URL"])?;
    for link in links {
        writer.write_record([
            link.status.label(),
            (u16::from(link.occurrences) + 1).to_string(),
            link.url.clone(),
        ])?;
    }
    writer.flush()?;

    Ok(path)
}

/// Write `links.html` into `dir` as a self-contained table document.
pub fn write_html_report(dir: &Path, links: &[Link]) -> Result<PathBuf, PrintError> {
    let path = dir.join(HTML_REPORT_NAME);
    std::fs::write(&path, render_html(links))?;
    Ok(path)
}

pub fn render_html(links: &[Link]) -> String {
    let mut page = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>links report</title>\n\
         <style>\n\
         body { font-family: sans-serif; margin: 2em; }\n\
         table { border-collapse: collapse; }\n\
         th, td { border: 1px solid #ccc; padding: 0.3em 0.8em; text-align: left; }\n\
         th { background: #f0f0f0; }\n\
         </style>\n</head>\n<body>\n<h1>links report</h1>\n<table>\n\
         <tr><th>Status</th><th>Occurrences</th><th>URL</th></tr>\n",
    );

    for link in links {
        page.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&link.status.label()),
            u16::from(link.occurrences) + 1,
            escape_html(&link.url),
        ));
    }

    page.push_str("</table>\n</body>\n</html>\n");
    page
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn open_report(path: &Path) -> std::io::Result<()> {
    let opener = match std::env::consts::OS {
        "linux" => "xdg-open",
        "macos" | "windows" => "open",
        _ => return Ok(()),
    };

    Command::new(opener).arg(path).status().map(|_| ())
}
