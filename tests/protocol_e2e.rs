use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use vemcache::{Dispatcher, Server, Vemcache};

/// Binds an ephemeral port and serves `dispatcher` in the background
async fn start_server(dispatcher: Dispatcher, max_line_bytes: usize) -> SocketAddr {
    let server = Server::bind("127.0.0.1:0", dispatcher, max_line_bytes)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

fn new_dispatcher() -> Dispatcher {
    Dispatcher::new(Arc::new(RwLock::new(Vemcache::new())))
}

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Client {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Client { lines: BufReader::new(reader).lines(), writer }
    }

    async fn send_raw(&mut self, bytes: &[u8]) -> String {
        self.writer.write_all(bytes).await.unwrap();
        let line = timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("response timed out")
            .unwrap();
        line.expect("connection closed")
    }

    async fn send(&mut self, line: &str) -> String {
        self.send_raw(format!("{}\n", line).as_bytes()).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_similarity_scenario_over_tcp() {
    let addr = start_server(new_dispatcher(), 1 << 20).await;
    let mut client = Client::connect(addr).await;

    assert_eq!(client.send("ping").await, "PONG");
    assert_eq!(client.send("named_insert A 1 0").await, "OK");
    assert_eq!(client.send("named_insert B 0 1").await, "OK");
    assert_eq!(client.send("named_insert C 1 1").await, "OK");

    assert_eq!(client.send("vcosine A B").await, "0.0");
    let cos: f64 = client.send("vcosine A C").await.parse().unwrap();
    assert!((cos - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-9);

    assert_eq!(client.send("knn A 2").await, format!("C:{:?} B:0.0", cos));
    assert_eq!(client.send("count").await, "3");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_arithmetic_does_not_mutate() {
    let addr = start_server(new_dispatcher(), 1 << 20).await;
    let mut client = Client::connect(addr).await;

    client.send("named_insert A 1 2").await;
    client.send("named_insert B 3 4").await;

    assert_eq!(client.send("vadd A B").await, "4.0 6.0");
    assert_eq!(client.send("vsub B A").await, "2.0 2.0");
    assert_eq!(client.send("vscale A 0.5").await, "0.5 1.0");
    assert_eq!(client.send("get A").await, "1.0 2.0");
    assert_eq!(client.send("get B").await, "3.0 4.0");
    assert_eq!(client.send("count").await, "2");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_errors_keep_connection_open() {
    let addr = start_server(new_dispatcher(), 1 << 20).await;
    let mut client = Client::connect(addr).await;

    client.send("named_insert A 1 2").await;
    client.send("named_insert T 1 2 3").await;

    assert_eq!(client.send("get nope").await, "ERR not_found: key 'nope' not found");
    assert!(client.send("frobnicate").await.starts_with("ERR protocol:"));
    assert!(client.send("named_insert A 1 x").await.starts_with("ERR protocol:"));
    assert!(client.send("knn A 0").await.starts_with("ERR invalid_argument:"));
    assert!(client.send("vadd A T").await.starts_with("ERR dimension_mismatch:"));
    assert!(client.send("").await.starts_with("ERR protocol:"));

    assert_eq!(client.send("get A").await, "1.0 2.0");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_oversize_line_recovers() {
    let addr = start_server(new_dispatcher(), 64).await;
    let mut client = Client::connect(addr).await;

    let long = format!("named_insert big {}\n", vec!["1.0"; 100].join(" "));
    assert!(client.send_raw(long.as_bytes()).await.starts_with("ERR protocol:"));

    assert_eq!(client.send("count").await, "0");
    assert_eq!(client.send("ping").await, "PONG");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_utf8_and_crlf() {
    let addr = start_server(new_dispatcher(), 1 << 20).await;
    let mut client = Client::connect(addr).await;

    assert!(client.send_raw(b"get \xff\n").await.starts_with("ERR protocol:"));
    assert_eq!(client.send_raw(b"named_insert A 1 2\r\n").await, "OK");
    assert_eq!(client.send_raw(b"get A\r\n").await, "1.0 2.0");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_clients_share_one_store() {
    let addr = start_server(new_dispatcher(), 1 << 20).await;
    let mut writer = Client::connect(addr).await;
    let mut reader = Client::connect(addr).await;

    let key = writer.send("insert 0.25 0.75").await;
    assert_eq!(reader.send(&format!("get {}", key)).await, "0.25 0.75");

    assert_eq!(reader.send(&format!("remove {}", key)).await, "OK");
    assert!(writer.send(&format!("get {}", key)).await.starts_with("ERR not_found:"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disconnect_does_not_affect_others() {
    let addr = start_server(new_dispatcher(), 1 << 20).await;

    let mut first = Client::connect(addr).await;
    first.send("named_insert keep 1 1").await;
    drop(first);

    let mut second = Client::connect(addr).await;
    assert_eq!(second.send("get keep").await, "1.0 1.0");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_load_script_workload() {
    let addr = start_server(new_dispatcher(), 1 << 20).await;
    let clients = 8;
    let per_client = 200;

    let mut handles = Vec::new();
    for c in 0..clients {
        handles.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;
            for i in 0..per_client {
                let x = (c * per_client + i) as f64;
                let line = format!("named_insert vector{}_{} {} {} 1", c, i, x, -x);
                assert_eq!(client.send(&line).await, "OK");
            }
            for i in (0..per_client).step_by(20) {
                let reply = client.send(&format!("knn vector{}_{} 5", c, i)).await;
                assert_eq!(reply.split(' ').count(), 5, "{}", reply);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut client = Client::connect(addr).await;
    assert_eq!(client.send("count").await, (clients * per_client).to_string());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dump_then_preload() {
    let dir = TempDir::new().unwrap();
    let dispatcher = new_dispatcher().with_dump_dir(dir.path());
    let addr = start_server(dispatcher, 1 << 20).await;
    let mut client = Client::connect(addr).await;

    client.send("named_insert a 1 0").await;
    client.send("named_insert b 0.5 0.5").await;

    let json = dir.path().join("snap.json");
    let bin = dir.path().join("snap.bin");
    assert_eq!(client.send("dump snap.json").await, format!("OK {}", json.display()));
    assert_eq!(client.send("dump snap.bin").await, format!("OK {}", bin.display()));

    for path in [json, bin] {
        let args = vemcache::config::StoreArgs { dump_dir: None, preload: Some(path) };
        let restored = args.open().unwrap();
        assert_eq!(restored.handle_line("count"), "2");
        assert_eq!(restored.handle_line("get b"), "0.5 0.5");
        assert_eq!(restored.handle_line("knn a 1"), client.send("knn a 1").await);
    }
}
