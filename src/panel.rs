//! HTTP control panel
//!
//! A minimal HTTP/1.1 server over a plain `TcpListener`: a status page
//! with start/stop/choreography buttons, a JSON telemetry endpoint and a
//! form-post action endpoint. One request per connection, bounded request
//! size, read timeout per client. Choreographies run on their own thread
//! so a slow figure never stalls the accept loop.

use crate::config::PanelConfig;
use crate::error::{Error, Result};
use crate::nav::choreo;
use crate::nav::controller::NavController;
use log::{debug, info, warn};
use serde::Serialize;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const MAX_REQUEST_BYTES: usize = 16 * 1024;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Car control panel</title>
<style>
body { font-family: sans-serif; margin: 2em; }
button { font-size: 1.2em; margin: 0.2em; padding: 0.5em 1.5em; }
td { padding: 0.2em 1em; }
</style>
</head>
<body>
<h1>Car control panel</h1>
<form method="post" action="/action">
<button name="action" value="start">Start</button>
<button name="action" value="stop">Stop</button>
<button name="action" value="spin">Spin</button>
<button name="action" value="eight">Figure eight</button>
</form>
<table>
<tr><td>Front</td><td id="front">-</td></tr>
<tr><td>Left</td><td id="left">-</td></tr>
<tr><td>Right</td><td id="right">-</td></tr>
<tr><td>Speed</td><td id="speed">-</td></tr>
<tr><td>Running</td><td id="running">-</td></tr>
</table>
<script>
async function refresh() {
  const r = await fetch('/api/distances');
  const s = await r.json();
  for (const k of ['front', 'left', 'right']) {
    document.getElementById(k).textContent = s[k].toFixed(1) + ' cm';
  }
  document.getElementById('speed').textContent = s.speed.toFixed(2);
  document.getElementById('running').textContent = s.running ? 'yes' : 'no';
}
setInterval(refresh, 1000);
refresh();
</script>
</body>
</html>
"#;

#[derive(Serialize)]
struct StatusReport {
    front: f64,
    left: f64,
    right: f64,
    speed: f64,
    running: bool,
}

struct Request {
    method: String,
    path: String,
    body: String,
}

/// The panel server; `run` blocks until the running flag clears
pub struct ControlPanel {
    bind_address: String,
    controller: Arc<NavController>,
    running: Arc<AtomicBool>,
}

impl ControlPanel {
    pub fn new(
        config: &PanelConfig,
        controller: Arc<NavController>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            bind_address: config.bind_address.clone(),
            controller,
            running,
        }
    }

    pub fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_address)?;
        listener.set_nonblocking(true)?;
        info!("Control panel listening on {}", self.bind_address);

        while self.running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    debug!("Panel client {}", addr);
                    if let Err(e) = self.handle_client(stream) {
                        debug!("Panel client error: {}", e);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => warn!("Panel accept failed: {}", e),
            }
        }
        info!("Control panel stopped");
        Ok(())
    }

    fn handle_client(&self, mut stream: TcpStream) -> Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(Duration::from_millis(500)))?;
        let request = read_request(&mut stream)?;
        let response = self.route(&request);
        stream.write_all(response.as_bytes())?;
        Ok(())
    }

    fn route(&self, request: &Request) -> String {
        match (request.method.as_str(), request.path.as_str()) {
            ("GET", "/") => http_response(200, "text/html; charset=utf-8", INDEX_HTML),
            ("GET", "/api/distances") => self.status_json(),
            ("POST", "/action") => self.handle_action(&request.body),
            _ => http_response(404, "text/plain", "not found"),
        }
    }

    fn status_json(&self) -> String {
        let distances = self.controller.get_distances();
        let report = StatusReport {
            front: distances.front,
            left: distances.left,
            right: distances.right,
            speed: self.controller.get_speed(),
            running: self.controller.is_running(),
        };
        match serde_json::to_string(&report) {
            Ok(json) => http_response(200, "application/json", &json),
            Err(e) => http_response(500, "text/plain", &format!("serialize: {}", e)),
        }
    }

    fn handle_action(&self, body: &str) -> String {
        match form_value(body, "action") {
            Some("start") => {
                info!("Panel: start");
                match self.controller.start() {
                    Ok(()) => redirect_to_index(),
                    Err(e) => http_response(500, "text/plain", &e.to_string()),
                }
            }
            Some("stop") => {
                info!("Panel: stop");
                self.controller.stop();
                redirect_to_index()
            }
            Some("spin") => self.spawn_choreography("panel-spin", |controller| {
                controller.spin_in_place(
                    choreo::DEFAULT_SPIN_DURATION_S,
                    choreo::DEFAULT_SPIN_SPEED_PCT,
                )
            }),
            Some("eight") => self.spawn_choreography("panel-eight", |controller| {
                controller.figure_eight(
                    choreo::DEFAULT_EIGHT_LAPS,
                    choreo::DEFAULT_EIGHT_ARC_S,
                    choreo::DEFAULT_EIGHT_SPEED_PCT,
                )
            }),
            Some(other) => {
                warn!("Panel: unknown action '{}'", other);
                http_response(400, "text/plain", "unknown action")
            }
            None => http_response(400, "text/plain", "missing action"),
        }
    }

    fn spawn_choreography<F>(&self, name: &str, figure: F) -> String
    where
        F: FnOnce(&NavController) -> Result<()> + Send + 'static,
    {
        info!("Panel: {}", name);
        let controller = Arc::clone(&self.controller);
        let spawn = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                if let Err(e) = figure(&controller) {
                    warn!("Choreography refused: {}", e);
                }
            });
        match spawn {
            Ok(_) => redirect_to_index(),
            Err(e) => http_response(500, "text/plain", &format!("spawn: {}", e)),
        }
    }
}

/// Value of `key` in a URL-encoded form body
fn form_value<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    body.split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

fn http_response(status: u16, content_type: &str, body: &str) -> String {
    let reason = match status {
        200 => "OK",
        303 => "See Other",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Internal Server Error",
    };
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        content_type,
        body.len(),
        body
    )
}

fn redirect_to_index() -> String {
    "HTTP/1.1 303 See Other\r\nLocation: /\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        .to_string()
}

fn read_request(stream: &mut TcpStream) -> Result<Request> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if buf.len() > MAX_REQUEST_BYTES {
            return Err(Error::InvalidCommand("request too large".to_string()));
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(Error::InvalidCommand("truncated request".to_string()));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = headers.lines();
    let request_line = lines
        .next()
        .ok_or_else(|| Error::InvalidCommand("empty request".to_string()))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| Error::InvalidCommand("bad request line".to_string()))?
        .to_string();
    let path = parts
        .next()
        .ok_or_else(|| Error::InvalidCommand("bad request line".to_string()))?
        .to_string();

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_REQUEST_BYTES {
        return Err(Error::InvalidCommand("request too large".to_string()));
    }

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(Error::InvalidCommand("truncated body".to_string()));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..header_end + content_length]).to_string();

    Ok(Request { method, path, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CarConfig;
    use crate::hw;
    use crate::nav::control_loop::ControlLoop;
    use crate::nav::controller::Telemetry;

    fn panel() -> ControlPanel {
        let config = CarConfig::default();
        let set = hw::create_hardware(&config).unwrap();
        let telemetry = Arc::new(Telemetry::new());
        let cancel = Arc::new(AtomicBool::new(false));
        let control = ControlLoop::new(
            config.nav.clone(),
            set.drive,
            set.steering,
            set.front,
            set.left,
            set.right,
            Arc::clone(&telemetry),
            Arc::clone(&cancel),
        );
        let controller = Arc::new(NavController::new(control, telemetry, cancel));
        ControlPanel::new(&config.panel, controller, Arc::new(AtomicBool::new(true)))
    }

    fn request(method: &str, path: &str, body: &str) -> Request {
        Request {
            method: method.to_string(),
            path: path.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_form_value() {
        assert_eq!(form_value("action=start", "action"), Some("start"));
        assert_eq!(form_value("a=1&action=spin&b=2", "action"), Some("spin"));
        assert_eq!(form_value("a=1&b=2", "action"), None);
        assert_eq!(form_value("", "action"), None);
    }

    #[test]
    fn test_index_served() {
        let panel = panel();
        let response = panel.route(&request("GET", "/", ""));
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("Car control panel"));
    }

    #[test]
    fn test_status_is_json() {
        let panel = panel();
        let response = panel.route(&request("GET", "/api/distances", ""));
        assert!(response.starts_with("HTTP/1.1 200"));
        let body = response.split("\r\n\r\n").nth(1).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(body).unwrap();
        assert!(parsed["front"].is_f64());
        assert_eq!(parsed["running"], serde_json::Value::Bool(false));
    }

    #[test]
    fn test_unknown_path_404() {
        let panel = panel();
        let response = panel.route(&request("GET", "/nope", ""));
        assert!(response.starts_with("HTTP/1.1 404"));
    }

    #[test]
    fn test_unknown_action_400() {
        let panel = panel();
        let response = panel.route(&request("POST", "/action", "action=dance"));
        assert!(response.starts_with("HTTP/1.1 400"));
    }

    #[test]
    fn test_start_and_stop_round_trip() {
        let panel = panel();
        let response = panel.route(&request("POST", "/action", "action=start"));
        assert!(response.starts_with("HTTP/1.1 303"));
        assert!(panel.controller.is_running());
        let response = panel.route(&request("POST", "/action", "action=stop"));
        assert!(response.starts_with("HTTP/1.1 303"));
        assert!(!panel.controller.is_running());
    }
}
