use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;

use crate::device::domain::remote_device::{DeviceError, RemoteDevice};
use crate::shared::face_rect::DetectionReport;

/// [`RemoteDevice`] over plain HTTP with a blocking `reqwest` client.
pub struct HttpRemoteDevice {
    client: Client,
    capture_url: String,
    saved_photo_url: String,
    report_url: String,
}

impl HttpRemoteDevice {
    pub fn new(
        capture_url: impl Into<String>,
        saved_photo_url: impl Into<String>,
        report_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            capture_url: capture_url.into(),
            saved_photo_url: saved_photo_url.into(),
            report_url: report_url.into(),
        })
    }

    fn get(&self, url: &str) -> Result<Response, DeviceError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|source| transport(url, source))?;
        check_status(url, response)
    }
}

impl RemoteDevice for HttpRemoteDevice {
    fn request_capture(&self) -> Result<(), DeviceError> {
        self.get(&self.capture_url).map(drop)
    }

    fn fetch_saved_photo(&self) -> Result<Vec<u8>, DeviceError> {
        let url = &self.saved_photo_url;
        let bytes = self
            .get(url)?
            .bytes()
            .map_err(|source| transport(url, source))?;
        Ok(bytes.to_vec())
    }

    fn report_faces(&self, report: &DetectionReport) -> Result<(), DeviceError> {
        let url = &self.report_url;
        let body = report.to_json()?;
        log::debug!("POST {url}: {body}");
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|source| transport(url, source))?;
        check_status(url, response).map(drop)
    }
}

fn transport(url: &str, source: reqwest::Error) -> DeviceError {
    DeviceError::Transport {
        url: url.to_string(),
        source,
    }
}

fn check_status(url: &str, response: Response) -> Result<Response, DeviceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(DeviceError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body: response.text().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::face_rect::FaceRect;
    use std::io::Read;
    use std::sync::mpsc;
    use tiny_http::{Response as HttpResponse, Server};

    #[derive(Debug)]
    struct Seen {
        method: String,
        path: String,
        content_type: Option<String>,
        body: String,
    }

    /// Loopback device answering every request with `status` and `body`.
    fn fake_device(status: u16, body: &'static [u8]) -> (String, mpsc::Receiver<Seen>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let base = format!("http://{}", server.server_addr().to_ip().unwrap());
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            for mut req in server.incoming_requests() {
                let mut body_text = String::new();
                let _ = req.as_reader().read_to_string(&mut body_text);
                let content_type = req
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Content-Type"))
                    .map(|h| h.value.to_string());
                let _ = tx.send(Seen {
                    method: req.method().to_string(),
                    path: req.url().to_string(),
                    content_type,
                    body: body_text,
                });
                let _ = req.respond(HttpResponse::from_data(body.to_vec()).with_status_code(status));
            }
        });
        (base, rx)
    }

    fn device(base: &str) -> HttpRemoteDevice {
        HttpRemoteDevice::new(
            format!("{base}/capture"),
            format!("{base}/saved-photo"),
            format!("{base}/face-detection"),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn recv(rx: &mpsc::Receiver<Seen>) -> Seen {
        rx.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_capture_sends_bodyless_get() {
        let (base, rx) = fake_device(200, b"ok");
        device(&base).request_capture().unwrap();

        let seen = recv(&rx);
        assert_eq!(seen.method, "GET");
        assert_eq!(seen.path, "/capture");
        assert!(seen.body.is_empty());
    }

    #[test]
    fn test_capture_non_success_is_status_error() {
        let (base, _rx) = fake_device(503, b"busy");
        let err = device(&base).request_capture().unwrap_err();
        match err {
            DeviceError::Status { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "busy");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unreachable_device_is_transport_error() {
        // Bind then drop to get a port with nothing listening.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let err = device(&format!("http://127.0.0.1:{port}"))
            .request_capture()
            .unwrap_err();
        assert!(matches!(err, DeviceError::Transport { .. }));
    }

    #[test]
    fn test_report_posts_json_array() {
        let (base, rx) = fake_device(200, b"");
        let report = DetectionReport::new(vec![
            FaceRect::new(10, 10, 40, 40).unwrap(),
            FaceRect::new(60, 5, 30, 32).unwrap(),
        ]);
        device(&base).report_faces(&report).unwrap();

        let seen = recv(&rx);
        assert_eq!(seen.method, "POST");
        assert_eq!(seen.path, "/face-detection");
        assert_eq!(seen.content_type.as_deref(), Some("application/json"));
        assert_eq!(
            seen.body,
            r#"[{"x":10,"y":10,"w":40,"h":40},{"x":60,"y":5,"w":30,"h":32}]"#
        );
    }

    #[test]
    fn test_fetch_saved_photo_returns_body() {
        let (base, rx) = fake_device(200, b"\xff\xd8jpeg-bytes");
        let bytes = device(&base).fetch_saved_photo().unwrap();
        assert_eq!(bytes, b"\xff\xd8jpeg-bytes");
        assert_eq!(recv(&rx).path, "/saved-photo");
    }
}
