use anyhow::Result;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;
use tmlharvest::config::{FetchConfig, HarvestConfig, TransportErrorPolicy};
use tmlharvest::fetch::{FetchOutcome, Fetcher, resource_url};
use tmlharvest::manifest::load_manifest;
use tmlharvest::pipeline::{FetchOptions, fetch_resources, merge_originals};

#[test]
fn every_resource_is_attempted_in_order() -> Result<()> {
    let server = TestServer::spawn(HashMap::from([
        ("/1968.csv".to_string(), b"a,b\n1,2\n".to_vec()),
        ("/1970.csv".to_string(), b"a,b\n3,4\n".to_vec()),
    ]))?;
    let dest = tempdir()?;

    let fetcher = Fetcher::new(&server.fetch_config())?;
    let report = fetcher.fetch_all(&names(&["1968.csv", "1969.csv", "1970.csv"]), dest.path())?;

    assert_eq!(report.attempted(), 3);
    assert_eq!(report.downloaded(), 2);
    assert_eq!(report.failed(), 1);
    let order: Vec<&str> = report.records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(order, ["1968.csv", "1969.csv", "1970.csv"]);
    assert_eq!(report.records[1].outcome, FetchOutcome::HttpFailure { status: 404 });
    assert_eq!(
        server.requests(),
        ["/1968.csv", "/1969.csv", "/1970.csv"]
    );

    assert_eq!(fs::read(dest.path().join("1968.csv"))?, b"a,b\n1,2\n");
    assert!(!dest.path().join("1969.csv").exists());
    assert_eq!(fs::read(dest.path().join("1970.csv"))?, b"a,b\n3,4\n");
    Ok(())
}

#[test]
fn existing_files_are_overwritten() -> Result<()> {
    let server = TestServer::spawn(HashMap::from([(
        "/2024.csv".to_string(),
        b"fresh\n".to_vec(),
    )]))?;
    let dest = tempdir()?;
    fs::write(dest.path().join("2024.csv"), b"stale\n")?;

    let report = Fetcher::new(&server.fetch_config())?
        .fetch_all(&names(&["2024.csv"]), dest.path())?;

    assert!(report.records[0].is_success());
    assert_eq!(fs::read(dest.path().join("2024.csv"))?, b"fresh\n");
    Ok(())
}

#[test]
fn transport_errors_are_skipped_by_default() -> Result<()> {
    let dest = tempdir()?;
    let config = FetchConfig {
        base_url: closed_port_url()?,
        timeout_secs: 5,
        use_system_proxy: false,
        ..FetchConfig::default()
    };

    let report =
        Fetcher::new(&config)?.fetch_all(&names(&["1968.csv", "1969.csv"]), dest.path())?;

    assert_eq!(report.attempted(), 2);
    assert!(
        report
            .records
            .iter()
            .all(|r| matches!(r.outcome, FetchOutcome::TransportFailure { .. }))
    );
    Ok(())
}

#[test]
fn transport_errors_abort_when_configured() -> Result<()> {
    let dest = tempdir()?;
    let config = FetchConfig {
        base_url: closed_port_url()?,
        timeout_secs: 5,
        use_system_proxy: false,
        on_transport_error: TransportErrorPolicy::Abort,
        ..FetchConfig::default()
    };

    let report =
        Fetcher::new(&config)?.fetch_all(&names(&["1968.csv", "1969.csv"]), dest.path())?;

    assert_eq!(report.aborted_at.as_deref(), Some("1968.csv"));
    assert_eq!(report.attempted(), 1);
    assert!(matches!(
        report.records[0].outcome,
        FetchOutcome::TransportFailure { .. }
    ));
    assert_eq!(fs::read_dir(dest.path())?.count(), 0);
    Ok(())
}

#[test]
fn aborted_fetch_still_writes_manifest() -> Result<()> {
    let data = tempdir()?;
    let mut config = HarvestConfig::default();
    config.paths.data_dir = data.path().to_path_buf();
    config.fetch.base_url = closed_port_url()?;
    config.fetch.timeout_secs = 5;
    config.fetch.use_system_proxy = false;
    config.fetch.on_transport_error = TransportErrorPolicy::Abort;
    config.fetch.resources.start_year = 2023;
    config.fetch.resources.end_year = 2024;

    let err = fetch_resources(&config, &FetchOptions::from_config(&config))
        .expect_err("abort policy must fail the run");
    assert!(format!("{err:#}").contains("aborted at 2023.csv"));

    let manifest = load_manifest(&config.paths.manifest_path())?;
    assert_eq!(manifest.aborted_at.as_deref(), Some("2023.csv"));
    assert_eq!(manifest.records.len(), 1);
    assert_eq!(manifest.failed, 1);
    Ok(())
}

#[test]
fn fetch_then_merge_round_trip() -> Result<()> {
    let server = TestServer::spawn(HashMap::from([
        ("/2023.csv".to_string(), b"winner,loser\nA,B\n".to_vec()),
        ("/2024.csv".to_string(), b"winner,loser,surface\nC,D,Clay\n".to_vec()),
    ]))?;
    let data = tempdir()?;

    let mut config = HarvestConfig::default();
    config.paths.data_dir = data.path().to_path_buf();
    config.fetch = server.fetch_config();
    config.fetch.resources.start_year = 2022;
    config.fetch.resources.end_year = 2024;
    config.validate()?;

    let report = fetch_resources(&config, &FetchOptions::from_config(&config))?;
    assert_eq!(report.attempted(), 3);
    assert_eq!(report.downloaded(), 2);

    let manifest = load_manifest(&config.paths.manifest_path())?;
    assert_eq!(manifest.downloaded, 2);
    assert_eq!(manifest.failed, 1);
    assert_eq!(manifest.records, report.records);

    let merged = merge_originals(&config)?;
    assert_eq!(merged.files_merged(), 2);
    assert_eq!(
        fs::read_to_string(config.paths.merged_path())?,
        "winner,loser,surface\nA,B,\nC,D,Clay\n"
    );
    Ok(())
}

#[test]
fn resource_urls_join_base_and_name() -> Result<()> {
    assert_eq!(
        resource_url("https://raw.example.com/db/master", "1968.csv")?,
        "https://raw.example.com/db/master/1968.csv"
    );
    assert_eq!(
        resource_url("https://raw.example.com/db/master/", "1968.csv")?,
        "https://raw.example.com/db/master/1968.csv"
    );
    assert_eq!(
        resource_url("http://127.0.0.1:8080", "ATP Database.csv")?,
        "http://127.0.0.1:8080/ATP%20Database.csv"
    );
    assert!(resource_url("https://raw.example.com/db", "../1968.csv").is_err());
    Ok(())
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn closed_port_url() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(format!("http://127.0.0.1:{port}"))
}

/// Minimal HTTP/1.1 responder: known paths get 200 with their body, anything
/// else gets 404. Every connection is closed after one response.
struct TestServer {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    fn spawn(routes: HashMap<String, Vec<u8>>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&requests);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let _ = respond(stream, &routes, &seen);
            }
        });

        Ok(Self { base_url, requests })
    }

    fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            base_url: self.base_url.clone(),
            timeout_secs: 5,
            use_system_proxy: false,
            ..FetchConfig::default()
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

fn respond(
    stream: TcpStream,
    routes: &HashMap<String, Vec<u8>>,
    seen: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();
    if let Ok(mut seen) = seen.lock() {
        seen.push(path.clone());
    }

    let (status, body) = match routes.get(&path) {
        Some(body) => ("200 OK", body.as_slice()),
        None => ("404 Not Found", b"404: Not Found".as_slice()),
    };

    let mut stream = stream;
    write!(
        stream,
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )?;
    stream.write_all(body)?;
    stream.flush()
}
