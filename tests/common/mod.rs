//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::{fs, path::PathBuf, sync::Arc, time::Duration};

use tempfile::TempDir;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

use sheetdb::engine::{Engine, EngineConfig, Schema, WhereMode};
use sheetdb::server::serve_listener;

pub const SCHEMA: &str = r#"{
    "name": "pub",
    "tuples_limit": 3,
    "structure": {
        "beer": ["name", "style"],
        "cars": ["model", "maker"]
    }
}"#;

/// An engine over a fresh temporary storage root.
pub struct TestDb {
    pub dir: TempDir,
    pub engine: Engine,
}

impl TestDb {
    pub fn new() -> Self {
        Self::with_mode(WhereMode::Joined)
    }

    pub fn with_mode(mode: WhereMode) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let engine = open(&dir, mode);
        Self { dir, engine }
    }

    /// Closes the engine and opens the same storage again.
    pub fn reopen(self) -> Self {
        let TestDb { dir, engine } = self;
        drop(engine);
        let engine = open(&dir, WhereMode::Joined);
        Self { dir, engine }
    }

    pub fn table_dir(&self, table: &str) -> PathBuf {
        self.dir.path().join("pub").join(table)
    }

    /// Sheet files of `table`, numerically sorted.
    pub fn pages(&self, table: &str) -> Vec<u64> {
        let mut pages: Vec<u64> = fs::read_dir(self.table_dir(table))
            .unwrap()
            .filter_map(|e| {
                let name = e.unwrap().file_name().into_string().unwrap();
                name.strip_suffix(".csv")?.parse().ok()
            })
            .collect();
        pages.sort_unstable();
        pages
    }

    pub fn page(&self, table: &str, page: u64) -> String {
        fs::read_to_string(self.table_dir(table).join(format!("{page}.csv"))).unwrap()
    }

    pub fn pk_sequence(&self, table: &str) -> String {
        fs::read_to_string(self.table_dir(table).join(format!("{table}_pk_sequence"))).unwrap()
    }
}

fn open(dir: &TempDir, mode: WhereMode) -> Engine {
    let schema = Schema::from_json(SCHEMA).unwrap();
    let config = EngineConfig {
        storage_path: dir.path().to_path_buf(),
        where_mode: mode,
    };
    Engine::open(config, schema).unwrap()
}

/// A server on an ephemeral port, aborted on drop.
pub struct TestServer {
    pub addr: String,
    pub dir: TempDir,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(conn_timeout: Option<Duration>) -> Self {
        let TestDb { dir, engine } = TestDb::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let engine = Arc::new(engine);
        let handle = tokio::spawn(async move {
            let _ = serve_listener(engine, listener, conn_timeout).await;
        });
        Self { addr, dir, handle }
    }

    pub async fn connect(&self) -> Client {
        let mut client = Client {
            stream: TcpStream::connect(&self.addr).await.unwrap(),
        };
        client.expect_prompt().await;
        client
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct Client {
    pub stream: TcpStream,
}

impl Client {
    /// Reads until the next prompt and returns everything before it.
    pub async fn read_until_prompt(&mut self) -> String {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        while !buf.ends_with(b">> ") {
            let n = tokio::time::timeout(Duration::from_secs(5), self.stream.read(&mut byte))
                .await
                .expect("server response timed out")
                .unwrap();
            assert!(n > 0, "connection closed after {:?}", String::from_utf8_lossy(&buf));
            buf.push(byte[0]);
        }
        buf.truncate(buf.len() - 3);
        String::from_utf8(buf).unwrap()
    }

    pub async fn expect_prompt(&mut self) {
        assert_eq!(self.read_until_prompt().await, "");
    }

    /// Sends one command line and returns its response.
    pub async fn send(&mut self, command: &str) -> String {
        self.stream
            .write_all(format!("{command}\n").as_bytes())
            .await
            .unwrap();
        self.read_until_prompt().await
    }

    /// Waits for the server to close the connection.
    pub async fn expect_closed(&mut self) {
        let mut rest = Vec::new();
        let n = tokio::time::timeout(Duration::from_secs(5), self.stream.read_to_end(&mut rest))
            .await
            .expect("connection stayed open")
            .unwrap();
        assert_eq!(n, 0, "unexpected data {:?}", String::from_utf8_lossy(&rest));
    }
}
