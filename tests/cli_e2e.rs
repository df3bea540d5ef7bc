//! End-to-end CLI tests for the comprobantes binary.

mod support;

use std::error::Error;
use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use support::{clave, received_page_html};
use tempfile::TempDir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn comprobantes() -> Command {
    Command::cargo_bin("comprobantes").unwrap()
}

/// Writes captured pages and returns their paths.
fn write_pages(dir: &TempDir, pages: &[String]) -> Vec<String> {
    pages
        .iter()
        .enumerate()
        .map(|(i, html)| {
            let path = dir.path().join(format!("page{}.html", i + 1));
            fs::write(&path, html).unwrap();
            path.to_string_lossy().into_owned()
        })
        .collect()
}

/// Scans `numbers` on one captured page into `documents.json`.
fn scan_documents(dir: &TempDir, numbers: &[usize]) -> String {
    let pages = write_pages(dir, &[received_page_html(1, 1, numbers)]);
    let output = dir.path().join("documents.json");
    comprobantes()
        .args(["-q", "scan"])
        .arg(&pages[0])
        .arg("-o")
        .arg(&output)
        .assert()
        .success();
    output.to_string_lossy().into_owned()
}

// ==================== General ====================

#[test]
fn test_binary_help_displays_usage() {
    comprobantes()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Scan tax portal"));
}

#[test]
fn test_binary_version_displays_version() {
    comprobantes()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("comprobantes"));
}

#[test]
fn test_binary_requires_subcommand() {
    comprobantes()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_invalid_config_is_rejected() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let config = dir.path().join("config.json");
    fs::write(&config, r#"{"concurrency": 0}"#)?;
    let pages = write_pages(&dir, &[received_page_html(1, 1, &[1])]);

    comprobantes()
        .arg("--config")
        .arg(&config)
        .arg("scan")
        .arg(&pages[0])
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
    Ok(())
}

// ==================== Scan ====================

#[test]
fn test_scan_writes_documents_json() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let pages = write_pages(
        &dir,
        &[
            received_page_html(1, 2, &[1, 2, 3]),
            received_page_html(2, 2, &[4, 5]),
        ],
    );
    let output = dir.path().join("documents.json");

    comprobantes()
        .arg("scan")
        .args(&pages)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("5 documents"));

    let documents: Vec<serde_json::Value> = serde_json::from_str(&fs::read_to_string(&output)?)?;
    assert_eq!(documents.len(), 5);
    assert_eq!(documents[0]["claveAcceso"], clave(1));
    assert_eq!(documents[4]["pageNumber"], 2);
    Ok(())
}

#[test]
fn test_scan_without_table_fails() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let pages = write_pages(&dir, &["<html><body><p>Inicio</p></body></html>".to_string()]);

    comprobantes()
        .arg("scan")
        .arg(&pages[0])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Scan stopped early"));
    Ok(())
}

#[test]
fn test_scan_missing_page_file_fails() {
    comprobantes()
        .args(["scan", "/nonexistent/page.html"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read page"));
}

// ==================== Download ====================

#[tokio::test(flavor = "multi_thread")]
async fn test_download_writes_files() -> Result<(), Box<dyn Error>> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<?xml version=\"1.0\"?><a/>", "text/xml"))
        .expect(2)
        .mount(&server)
        .await;
    let dir = TempDir::new()?;
    let documents = scan_documents(&dir, &[1, 2]);
    let out = dir.path().join("out");

    comprobantes()
        .args(["-q", "download", "--documents", documents.as_str()])
        .arg("--page")
        .arg(dir.path().join("page1.html"))
        .args(["--endpoint", format!("{}/recibidos.jsf", server.uri()).as_str()])
        .arg("--output-dir")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Downloaded 2 of 2 documents"));

    assert!(out.join(format!("{}.xml", clave(1))).exists());
    assert!(out.join(format!("{}.xml", clave(2))).exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_download_session_loss_exits_with_code_2() -> Result<(), Box<dyn Error>> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let dir = TempDir::new()?;
    let documents = scan_documents(&dir, &[1, 2, 3]);

    comprobantes()
        .args(["-q", "download", "--documents", documents.as_str(), "-f", "pdf"])
        .arg("--page")
        .arg(dir.path().join("page1.html"))
        .args(["--endpoint", format!("{}/recibidos.jsf", server.uri()).as_str()])
        .arg("--output-dir")
        .arg(dir.path().join("out"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Session lost"));
    Ok(())
}

#[test]
fn test_download_selects_ids() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let documents = scan_documents(&dir, &[1]);

    // No matching id: nothing to request, so any endpoint works.
    comprobantes()
        .args(["-q", "download", "--documents", documents.as_str(), "--id", "missing"])
        .arg("--page")
        .arg(dir.path().join("page1.html"))
        .args(["--endpoint", "http://127.0.0.1:9/recibidos.jsf"])
        .arg("--output-dir")
        .arg(dir.path().join("out"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Downloaded 0 of 0 documents"));
    Ok(())
}
