#![cfg(feature = "cli")]

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use gt06::frame::{parse_frame, ChecksumPolicy, COMMAND};
use gt06::message::parse_command_frame;

const LOGIN: &str = "78780D010865209077286178000100960D0A";
const LOGIN_ACK: [u8; 10] = [0x78, 0x78, 0x05, 0x01, 0x00, 0x01, 0x00, 0x05, 0x0D, 0x0A];
const HEARTBEAT: &str = "78780A13C604040002000700DA0D0A";
const RELAY_COMMAND: &str = "787812800C0000000152454C41592C31230001281C0D0A";

fn gt06() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_gt06"));
    cmd.env_remove("GT06_BIND")
        .env_remove("GT06_SCRIPT")
        .env_remove("GT06_SNAPSHOT")
        .args(["--log-level", "error"]);
    cmd
}

fn run(args: &[&str]) -> Output {
    gt06().args(args).output().expect("gt06 should run")
}

fn stdout_json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("stdout line should be JSON"))
        .collect()
}

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "gt06cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .expect("ephemeral port should be available")
        .port()
}

fn wait_for_connect(port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let start = Instant::now();
    loop {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                if start.elapsed() >= timeout {
                    return Err(io::Error::other(format!("connect timeout: {err}")));
                }
                thread::sleep(Duration::from_millis(25));
            }
        }
    }
}

fn read_wire_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut head = [0u8; 3];
    stream.read_exact(&mut head).expect("frame header should arrive");
    let mut rest = vec![0u8; usize::from(head[2]) + 2];
    stream.read_exact(&mut rest).expect("frame body should arrive");
    let mut frame = head.to_vec();
    frame.extend_from_slice(&rest);
    frame
}

#[test]
fn version_prints_package_version() {
    let output = run(&["version"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("gt06 {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn extended_version_as_json() {
    let output = run(&["--format", "json", "version", "--extended"]);
    assert!(output.status.success());
    let info = &stdout_json_lines(&output)[0];
    assert_eq!(info["name"], "gt06");
    assert_eq!(info["default_port"], 9117);
}

#[test]
fn encode_command_prints_crc_frame() {
    let output = run(&["--format", "json", "encode-command", "RELAY,1#", "--serial", "1"]);
    assert!(output.status.success());
    let line = &stdout_json_lines(&output)[0];
    assert_eq!(line["frame"], RELAY_COMMAND);
    assert_eq!(line["serial"], 1);
    assert_eq!(line["command"], "RELAY,1#");
}

#[test]
fn encode_command_rejects_non_ascii() {
    let output = run(&["encode-command", "RELAIS,é#"]);
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("non-ASCII"));
}

#[test]
fn encode_command_rejects_serial_zero() {
    let output = run(&["encode-command", "WHERE#", "--serial", "0"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn decode_login_and_heartbeat() {
    let spaced = "78 78 0A 13 C6 04 04 00 02 00 07 00 DA 0D 0A";
    let output = run(&[
        "--format",
        "json",
        "decode",
        LOGIN,
        spaced,
        "--imei",
        "865209077286178",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let lines = stdout_json_lines(&output);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["type"], "login");
    assert_eq!(lines[0]["imei"], "865209077286178");
    assert_eq!(lines[0]["raw_imei"], "0865209077286178");
    assert_eq!(lines[1]["type"], "heartbeat");
    assert_eq!(lines[1]["serial"], 7);
    assert_eq!(lines[1]["imei"], "865209077286178");
}

#[test]
fn decode_command_frame() {
    let output = run(&["--format", "json", "decode", RELAY_COMMAND]);
    assert!(output.status.success());
    let line = &stdout_json_lines(&output)[0];
    assert_eq!(line["command"], "RELAY,1#");
    assert_eq!(line["server_flag"], 1);
}

#[test]
fn decode_reports_bad_frames_and_keeps_going() {
    let corrupt = "78780D010865209077286178000100970D0A";
    let output = run(&["--format", "json", "decode", corrupt, HEARTBEAT, "nothex"]);
    assert_eq!(output.status.code(), Some(60));

    let lines = stdout_json_lines(&output);
    assert_eq!(lines.len(), 3);
    assert!(lines[0]["error"]
        .as_str()
        .expect("error should be a string")
        .contains("checksum mismatch"));
    assert_eq!(lines[1]["type"], "heartbeat");
    assert!(lines[2]["error"]
        .as_str()
        .expect("error should be a string")
        .contains("invalid hex"));
}

#[test]
fn serve_rejects_invalid_script() {
    let dir = unique_temp_dir("bad-script");
    let script = dir.join("script.txt");
    std::fs::write(&script, "# setup\nTIMER,30#\nRELAIS,é#\n").expect("script should be writable");

    let output = gt06()
        .args(["serve", "--bind", "127.0.0.1:0", "--script"])
        .arg(&script)
        .output()
        .expect("serve should run");

    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("line 3"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn serve_acks_login_and_delivers_operator_command() {
    let dir = unique_temp_dir("serve");
    let events = dir.join("events.jsonl");
    let port = free_port();

    let mut child = gt06()
        .args(["--format", "json", "serve", "--operator", "--bind"])
        .arg(format!("127.0.0.1:{port}"))
        .arg("--events")
        .arg(&events)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");

    let mut device =
        wait_for_connect(port, Duration::from_secs(5)).expect("device should connect to gateway");
    device
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout should be settable");

    device
        .write_all(&hex::decode(LOGIN).expect("login hex"))
        .expect("login should send");
    assert_eq!(read_wire_frame(&mut device), LOGIN_ACK);

    let mut stdin = child.stdin.take().expect("stdin should be piped");
    writeln!(stdin, "865209077286178:WHERE#").expect("operator line should write");
    stdin.flush().expect("stdin should flush");

    let wire = read_wire_frame(&mut device);
    let frame = parse_frame(&wire, ChecksumPolicy::CrcItu).expect("command frame should parse");
    assert_eq!(frame.protocol, COMMAND);
    assert_eq!(
        parse_command_frame(&frame).expect("command payload").text,
        "WHERE#"
    );

    let stdout = child.stdout.take().expect("stdout should be piped");
    let mut lines = BufReader::new(stdout).lines();
    let mut saw_login = false;
    let mut saw_submit = false;
    while !(saw_login && saw_submit) {
        let line = lines
            .next()
            .expect("stdout should stay open")
            .expect("stdout should be readable");
        let value: serde_json::Value = serde_json::from_str(&line).expect("stdout line should be JSON");
        saw_login |= value["type"] == "login";
        saw_submit |= value["queued"] == "WHERE#";
    }

    let _ = child.kill();
    let _ = child.wait();

    let logged = std::fs::read_to_string(&events).expect("events file should exist");
    assert!(logged.lines().any(|line| line.contains("\"type\":\"login\"")));
    let _ = std::fs::remove_dir_all(&dir);
}
