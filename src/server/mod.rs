//! HTTP server for the contact book API.

use anyhow::Result;
use chrono::Local;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

mod types;

pub use types::{
    ApiResponse, ContactPayload, CreatedResponse, HealthResponse, ServiceInfo, ToggleResponse,
};

use crate::db::{transfer, Database};
use crate::error::Error;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// HTTP server exposing the contact book over REST. Every request opens its
/// own database handle; nothing is shared between operations.
pub struct ApiServer {
    port: u16,
    db_path: PathBuf,
    start_time: Instant,
}

impl ApiServer {
    pub fn new(port: u16, db_path: PathBuf) -> Result<Self> {
        // Verify DB is accessible (and create the schema on first run)
        let db = Database::open_at(db_path.clone())?;
        drop(db);

        Ok(Self {
            port,
            db_path,
            start_time: Instant::now(),
        })
    }

    /// Start the server (blocking).
    pub fn start(&self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let listener = TcpListener::bind(format!("0.0.0.0:{}", self.port))?;
        listener.set_nonblocking(true)?;

        println!("Contact book API listening on 0.0.0.0:{}", self.port);

        while !shutdown.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _peer_addr)) => {
                    if let Err(e) = self.handle_connection(stream) {
                        eprintln!("Request error: {}", e);
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
                Err(e) => {
                    eprintln!("Accept error: {}", e);
                }
            }
        }

        Ok(())
    }

    fn handle_connection(&self, mut stream: TcpStream) -> Result<()> {
        stream.set_read_timeout(Some(std::time::Duration::from_secs(30)))?;
        stream.set_write_timeout(Some(std::time::Duration::from_secs(30)))?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut request_line = String::new();
        reader.read_line(&mut request_line)?;

        let parts: Vec<&str> = request_line.trim().split_whitespace().collect();
        if parts.len() < 2 {
            return self.send_response(&mut stream, 400, "Bad Request");
        }

        let method = parts[0];
        let path = parts[1];

        // Parse headers; only Content-Length matters for this API.
        let mut content_length = 0usize;
        loop {
            let mut header_line = String::new();
            reader.read_line(&mut header_line)?;
            let header_line = header_line.trim();
            if header_line.is_empty() {
                break;
            }
            if let Some((key, value)) = header_line.split_once(':') {
                if key.trim().eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
        }

        // Read body
        let mut body = vec![0u8; content_length];
        if content_length > 0 {
            std::io::Read::read_exact(&mut reader, &mut body)?;
        }

        // Route request
        match (method, path) {
            // Browser front ends send preflights before PUT/DELETE.
            ("OPTIONS", _) => self.send_preflight(&mut stream),

            ("GET", "/") => self.handle_root(&mut stream),
            ("GET", "/health") => self.handle_health(&mut stream),

            ("GET", "/contacts") => self.handle_list(&mut stream),
            ("POST", "/contacts") => self.handle_create(&mut stream, &body),
            ("GET", "/contacts/favorites") => self.handle_favorites(&mut stream),
            ("GET", "/contacts/stats") => self.handle_stats(&mut stream),
            ("GET", "/contacts/export") => self.handle_export(&mut stream),
            ("POST", "/contacts/import") => self.handle_import(&mut stream, &body),
            ("GET", p) if p.starts_with("/contacts/search/") => {
                let keyword = p.strip_prefix("/contacts/search/").unwrap_or("");
                self.handle_search(&mut stream, &percent_decode(keyword))
            }
            ("PUT", p) if p.starts_with("/contacts/") && p.ends_with("/favorite") => {
                let id = p
                    .strip_prefix("/contacts/")
                    .and_then(|s| s.strip_suffix("/favorite"))
                    .and_then(|s| s.parse::<i64>().ok());
                match id {
                    Some(id) => self.handle_toggle_favorite(&mut stream, id),
                    None => self.send_response(&mut stream, 404, "Not Found"),
                }
            }
            ("PUT", p) if p.starts_with("/contacts/") => {
                match p.strip_prefix("/contacts/").and_then(|s| s.parse::<i64>().ok()) {
                    Some(id) => self.handle_update(&mut stream, id, &body),
                    None => self.send_response(&mut stream, 404, "Not Found"),
                }
            }
            ("DELETE", p) if p.starts_with("/contacts/") => {
                match p.strip_prefix("/contacts/").and_then(|s| s.parse::<i64>().ok()) {
                    Some(id) => self.handle_delete(&mut stream, id),
                    None => self.send_response(&mut stream, 404, "Not Found"),
                }
            }

            _ => self.send_response(&mut stream, 404, "Not Found"),
        }
    }

    // ==================== HANDLERS ====================

    fn open_db(&self) -> crate::error::Result<Database> {
        Database::open_at(self.db_path.clone())
    }

    fn handle_root(&self, stream: &mut TcpStream) -> Result<()> {
        let info = ServiceInfo {
            message: "contact book API is running".to_string(),
            version: VERSION.to_string(),
            features: vec![
                "favorites".to_string(),
                "multiple contact methods".to_string(),
                "csv import/export".to_string(),
            ],
        };
        self.send_json_response(stream, 200, &ApiResponse::ok(info))
    }

    fn handle_health(&self, stream: &mut TcpStream) -> Result<()> {
        match self.open_db().and_then(|db| db.stats()) {
            Ok(stats) => {
                let health = HealthResponse {
                    status: "ok".to_string(),
                    uptime_secs: self.start_time.elapsed().as_secs(),
                    total_contacts: stats.total_contacts,
                    version: VERSION.to_string(),
                };
                self.send_json_response(stream, 200, &ApiResponse::ok(health))
            }
            Err(e) => self.send_error(stream, &e),
        }
    }

    fn handle_list(&self, stream: &mut TcpStream) -> Result<()> {
        match self.open_db().and_then(|db| db.list_contacts()) {
            Ok(contacts) => self.send_json_response(stream, 200, &ApiResponse::ok(contacts)),
            Err(e) => self.send_error(stream, &e),
        }
    }

    fn handle_favorites(&self, stream: &mut TcpStream) -> Result<()> {
        match self.open_db().and_then(|db| db.list_favorites()) {
            Ok(contacts) => self.send_json_response(stream, 200, &ApiResponse::ok(contacts)),
            Err(e) => self.send_error(stream, &e),
        }
    }

    fn handle_create(&self, stream: &mut TcpStream, body: &[u8]) -> Result<()> {
        let payload: ContactPayload = match serde_json::from_slice(body) {
            Ok(p) => p,
            Err(e) => {
                let response: ApiResponse<()> =
                    ApiResponse::err(format!("invalid request body: {}", e));
                return self.send_json_response(stream, 400, &response);
            }
        };

        let name = payload.name.unwrap_or_default();
        match self
            .open_db()
            .and_then(|db| db.add_contact(&name, false, &payload.methods))
        {
            Ok(contact) => {
                let created = CreatedResponse {
                    id: contact.id,
                    name: contact.name,
                };
                self.send_json_response(stream, 201, &ApiResponse::ok(created))
            }
            Err(e) => self.send_error(stream, &e),
        }
    }

    fn handle_update(&self, stream: &mut TcpStream, id: i64, body: &[u8]) -> Result<()> {
        let payload: ContactPayload = match serde_json::from_slice(body) {
            Ok(p) => p,
            Err(e) => {
                let response: ApiResponse<()> =
                    ApiResponse::err(format!("invalid request body: {}", e));
                return self.send_json_response(stream, 400, &response);
            }
        };

        match self
            .open_db()
            .and_then(|db| db.update_contact(id, payload.name.as_deref(), &payload.methods))
        {
            Ok(()) => self
                .send_json_response(stream, 200, &ApiResponse::ok("contact updated".to_string())),
            Err(e) => self.send_error(stream, &e),
        }
    }

    fn handle_delete(&self, stream: &mut TcpStream, id: i64) -> Result<()> {
        match self.open_db().and_then(|db| db.delete_contact(id)) {
            Ok(()) => self
                .send_json_response(stream, 200, &ApiResponse::ok("contact deleted".to_string())),
            Err(e) => self.send_error(stream, &e),
        }
    }

    fn handle_toggle_favorite(&self, stream: &mut TcpStream, id: i64) -> Result<()> {
        match self.open_db().and_then(|db| db.toggle_favorite(id)) {
            Ok(contact) => {
                let toggled = ToggleResponse {
                    id: contact.id,
                    name: contact.name,
                    is_favorite: contact.is_favorite,
                };
                self.send_json_response(stream, 200, &ApiResponse::ok(toggled))
            }
            Err(e) => self.send_error(stream, &e),
        }
    }

    fn handle_search(&self, stream: &mut TcpStream, keyword: &str) -> Result<()> {
        match self.open_db().and_then(|db| db.search_contacts(keyword)) {
            Ok(contacts) => self.send_json_response(stream, 200, &ApiResponse::ok(contacts)),
            Err(e) => self.send_error(stream, &e),
        }
    }

    fn handle_stats(&self, stream: &mut TcpStream) -> Result<()> {
        match self.open_db().and_then(|db| db.stats()) {
            Ok(stats) => self.send_json_response(stream, 200, &ApiResponse::ok(stats)),
            Err(e) => self.send_error(stream, &e),
        }
    }

    fn handle_export(&self, stream: &mut TcpStream) -> Result<()> {
        let result = self.open_db().and_then(|db| db.export_rows()).and_then(|rows| {
            let mut buffer = Vec::new();
            transfer::write_csv(&rows, &mut buffer)?;
            Ok(buffer)
        });

        match result {
            Ok(buffer) => {
                let filename = format!(
                    "contacts_export_{}.csv",
                    Local::now().format("%Y%m%d_%H%M%S")
                );
                self.send_csv_response(stream, &filename, &buffer)
            }
            Err(e) => self.send_error(stream, &e),
        }
    }

    fn handle_import(&self, stream: &mut TcpStream, body: &[u8]) -> Result<()> {
        if body.is_empty() {
            let response: ApiResponse<()> = ApiResponse::err("no file content uploaded");
            return self.send_json_response(stream, 400, &response);
        }

        match self.open_db().and_then(|db| db.import_csv(body)) {
            Ok(report) => self.send_json_response(stream, 200, &ApiResponse::ok(report)),
            Err(e) => self.send_error(stream, &e),
        }
    }

    // ==================== RESPONSES ====================

    fn send_error(&self, stream: &mut TcpStream, err: &Error) -> Result<()> {
        let response: ApiResponse<()> = ApiResponse::err(err.to_string());
        self.send_json_response(stream, err.status_code(), &response)
    }

    fn send_preflight(&self, stream: &mut TcpStream) -> Result<()> {
        let response = format!(
            "HTTP/1.1 204 No Content\r\n{}Content-Length: 0\r\nConnection: close\r\n\r\n",
            cors_headers()
        );
        stream.write_all(response.as_bytes())?;
        stream.flush()?;
        Ok(())
    }

    fn send_response(&self, stream: &mut TcpStream, status: u16, message: &str) -> Result<()> {
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            status_text(status),
            cors_headers(),
            message.len(),
            message
        );

        stream.write_all(response.as_bytes())?;
        stream.flush()?;
        Ok(())
    }

    fn send_json_response<T: serde::Serialize>(
        &self,
        stream: &mut TcpStream,
        status: u16,
        body: &T,
    ) -> Result<()> {
        let json_body = serde_json::to_string(body)?;

        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            status_text(status),
            cors_headers(),
            json_body.len(),
            json_body
        );

        stream.write_all(response.as_bytes())?;
        stream.flush()?;
        Ok(())
    }

    fn send_csv_response(
        &self,
        stream: &mut TcpStream,
        filename: &str,
        body: &[u8],
    ) -> Result<()> {
        let header = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/csv; charset=utf-8\r\nContent-Disposition: attachment; filename=\"{}\"\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n",
            filename,
            cors_headers(),
            body.len()
        );

        stream.write_all(header.as_bytes())?;
        stream.write_all(body)?;
        stream.flush()?;
        Ok(())
    }
}

fn cors_headers() -> &'static str {
    "Access-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, POST, PUT, DELETE, OPTIONS\r\nAccess-Control-Allow-Headers: Content-Type\r\n"
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Decode %XX escapes in a path segment. Invalid escapes pass through as-is.
fn percent_decode(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(high), Some(low)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                out.push(high * 16 + low);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}
