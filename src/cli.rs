//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use comprobantes_core::DocumentFormat;

/// Scan tax portal document tables and batch download their files.
///
/// `scan` reads captured pages of the portal's received/issued documents
/// table; `download` requests each document's XML or PDF from the portal.
#[derive(Parser, Debug)]
#[command(name = "comprobantes")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// JSON config file with default settings
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract documents from captured table pages
    Scan(ScanArgs),
    /// Download the files of previously scanned documents
    Download(DownloadArgs),
}

#[derive(ClapArgs, Debug)]
pub struct ScanArgs {
    /// Captured portal pages, in paginator order
    #[arg(required = true, value_name = "HTML_PAGES")]
    pub pages: Vec<PathBuf>,

    /// Enlarge the page size before traversing
    #[arg(long)]
    pub optimize: bool,

    /// Write the documents as JSON to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// SQLite database for scan progress and results
    #[arg(long, value_name = "DB")]
    pub store: Option<PathBuf>,

    /// Wait after each page navigation in milliseconds (max 60000)
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub settle_delay: Option<u64>,
}

#[derive(ClapArgs, Debug)]
pub struct DownloadArgs {
    /// Documents JSON written by `scan`
    #[arg(long, value_name = "FILE", required_unless_present = "resume")]
    pub documents: Option<PathBuf>,

    /// Captured portal page holding the current state token and filters
    #[arg(long, value_name = "HTML")]
    pub page: PathBuf,

    /// Portal URL the download form posts to
    #[arg(long, value_name = "URL")]
    pub endpoint: String,

    /// File format to download
    #[arg(short, long, default_value = "xml")]
    pub format: DocumentFormat,

    /// Directory for downloaded files
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// SQLite database holding the download session
    #[arg(long, value_name = "DB")]
    pub store: Option<PathBuf>,

    /// Continue the session saved in the store
    #[arg(long)]
    pub resume: bool,

    /// Only download these document ids (repeatable)
    #[arg(long = "id", value_name = "ID")]
    pub ids: Vec<String>,

    /// Session cookie header sent with every request (e.g. "JSESSIONID=...")
    #[arg(long, value_name = "COOKIE")]
    pub cookie: Option<String>,

    /// Jobs per batch (1-100)
    #[arg(short = 'b', long, value_parser = clap::value_parser!(u64).range(1..=100))]
    pub batch_size: Option<u64>,

    /// Concurrent downloads within a batch (1-20)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u64).range(1..=20))]
    pub concurrency: Option<u64>,

    /// Maximum retry attempts for transient failures (0-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub max_retries: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn download_args(extra: &[&str]) -> Vec<String> {
        let mut args = vec![
            "comprobantes",
            "download",
            "--page",
            "page.html",
            "--endpoint",
            "https://portal.example/comprobantes.jsf",
        ];
        args.extend_from_slice(extra);
        args.into_iter().map(String::from).collect()
    }

    #[test]
    fn test_cli_scan_parses_pages_and_flags() {
        let args =
            Args::try_parse_from(["comprobantes", "scan", "p1.html", "p2.html", "--optimize"])
                .unwrap();
        let Command::Scan(scan) = args.command else {
            panic!("expected scan command");
        };
        assert_eq!(scan.pages.len(), 2);
        assert!(scan.optimize);
        assert!(scan.output.is_none());
    }

    #[test]
    fn test_cli_scan_requires_pages() {
        let result = Args::try_parse_from(["comprobantes", "scan"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["comprobantes", "-vv", "scan", "p.html"]).unwrap();
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["comprobantes", "scan", "p.html", "--verbose"]).unwrap();
        assert_eq!(args.verbose, 1);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["comprobantes", "-q", "scan", "p.html"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["comprobantes", "--help"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::DisplayHelp
        );
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let result = Args::try_parse_from(["comprobantes", "--version"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::DisplayVersion
        );
    }

    // ==================== Download Tests ====================

    #[test]
    fn test_cli_download_defaults() {
        let args = Args::try_parse_from(download_args(&["--documents", "docs.json"])).unwrap();
        let Command::Download(download) = args.command else {
            panic!("expected download command");
        };
        assert_eq!(download.format, DocumentFormat::Xml);
        assert!(!download.resume);
        assert!(download.concurrency.is_none());
        assert!(download.ids.is_empty());
    }

    #[test]
    fn test_cli_download_format_pdf() {
        let args =
            Args::try_parse_from(download_args(&["--documents", "d.json", "-f", "pdf"])).unwrap();
        let Command::Download(download) = args.command else {
            panic!("expected download command");
        };
        assert_eq!(download.format, DocumentFormat::Pdf);
    }

    #[test]
    fn test_cli_download_invalid_format_rejected() {
        let result = Args::try_parse_from(download_args(&["--documents", "d.json", "-f", "zip"]));
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );
    }

    #[test]
    fn test_cli_download_requires_documents_unless_resume() {
        let result = Args::try_parse_from(download_args(&[]));
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );

        let args = Args::try_parse_from(download_args(&["--resume"])).unwrap();
        let Command::Download(download) = args.command else {
            panic!("expected download command");
        };
        assert!(download.resume);
        assert!(download.documents.is_none());
    }

    #[test]
    fn test_cli_concurrency_bounds() {
        let args =
            Args::try_parse_from(download_args(&["--documents", "d.json", "-c", "20"])).unwrap();
        let Command::Download(download) = args.command else {
            panic!("expected download command");
        };
        assert_eq!(download.concurrency, Some(20));

        let result = Args::try_parse_from(download_args(&["--documents", "d.json", "-c", "0"]));
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );
    }

    #[test]
    fn test_cli_max_retries_over_max_rejected() {
        let result = Args::try_parse_from(download_args(&["--documents", "d.json", "-r", "11"]));
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );
    }

    #[test]
    fn test_cli_repeated_ids() {
        let args = Args::try_parse_from(download_args(&[
            "--documents",
            "d.json",
            "--id",
            "a",
            "--id",
            "b",
        ]))
        .unwrap();
        let Command::Download(download) = args.command else {
            panic!("expected download command");
        };
        assert_eq!(download.ids, vec!["a".to_string(), "b".to_string()]);
    }
}
