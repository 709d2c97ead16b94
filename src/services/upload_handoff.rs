// src/services/upload_handoff.rs
use crate::errors::{HueprintError, TransportError};
use crate::models::{EncodedPayload, HandoffState};
use async_trait::async_trait;
use log::{error, info, warn};
use reqwest::{Client, Url};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Whitespace as a browser regex `\s` sees it: Unicode `White_Space` plus
/// the byte order mark, minus NEL.
fn is_pattern_space(c: char) -> bool {
    c == '\u{feff}' || (c != '\u{85}' && c.is_whitespace())
}

/// Accepts `local@domain.tld`: no whitespace, exactly one `@`, and a dot
/// inside the domain with something on both sides.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    let plain =
        |part: &str| !part.is_empty() && !part.contains(|c: char| c == '@' || is_pattern_space(c));

    plain(local)
        && plain(domain)
        && domain
            .char_indices()
            .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// Remote storage the paid flow uploads to.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Stores the image and returns the file name the service assigned.
    async fn upload(&self, payload: &EncodedPayload, unique_id: Uuid) -> Result<String, TransportError>;
}

pub struct HttpStorageService {
    endpoint: String,
    client: Client,
}

impl HttpStorageService {
    pub fn new(api_base: &str, client: Client) -> Self {
        Self {
            endpoint: format!("{}/upload", api_base.trim_end_matches('/')),
            client,
        }
    }
}

#[async_trait]
impl StorageService for HttpStorageService {
    async fn upload(&self, payload: &EncodedPayload, unique_id: Uuid) -> Result<String, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "image": payload.body(),
                "uniqueId": unique_id.to_string(),
                "contentType": payload.media_type().as_mime(),
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Upload endpoint returned {}: {}", status, body);
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;

        result["fileName"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TransportError::Malformed("no `fileName` in response".to_string()))
    }
}

/// Correlation id for one upload, before the service has named the file.
#[derive(Debug)]
pub struct UploadTicket {
    unique_id: Uuid,
}

impl UploadTicket {
    pub fn new() -> Self {
        Self {
            unique_id: Uuid::new_v4(),
        }
    }

    pub fn unique_id(&self) -> Uuid {
        self.unique_id
    }

    /// Attaches the server-assigned file name. An empty name is rejected so a
    /// redirect never goes out without a reference.
    pub fn issue(self, server_file_name: String) -> Result<IssuedTicket, TransportError> {
        if server_file_name.trim().is_empty() {
            return Err(TransportError::Malformed("empty `fileName` in response".to_string()));
        }
        Ok(IssuedTicket {
            unique_id: self.unique_id,
            server_file_name,
        })
    }
}

#[derive(Debug)]
pub struct IssuedTicket {
    pub unique_id: Uuid,
    pub server_file_name: String,
}

#[derive(Debug, Clone)]
pub struct PaymentPage {
    base: Url,
}

impl PaymentPage {
    pub fn parse(url: &str) -> Result<Self, HueprintError> {
        let base = Url::parse(url)
            .map_err(|e| HueprintError::Config(format!("invalid payment URL {url:?}: {e}")))?;
        Ok(Self { base })
    }

    /// Consumes the ticket; each upload leads to exactly one redirect.
    pub fn redirect_url(&self, email: &str, ticket: IssuedTicket) -> Url {
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("prefilled_email", email)
            .append_pair("client_reference_id", &ticket.server_file_name);
        url
    }
}

/// Leaves `Uploading` when a checkout ends, including when its future is
/// dropped mid-upload (the browser went away).
struct UploadingGuard<'a> {
    state: &'a watch::Sender<HandoffState>,
    armed: bool,
}

impl UploadingGuard<'_> {
    fn finish(mut self, next: HandoffState) {
        self.armed = false;
        self.state.send_replace(next);
    }
}

impl Drop for UploadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Upload cancelled before the service answered");
            self.state.send_replace(HandoffState::Idle {
                last_error: Some(UPLOAD_CANCELLED.to_string()),
            });
        }
    }
}

pub const UPLOAD_CANCELLED: &str = "upload cancelled";

/// Paid flow: upload the image, then send the user to the payment page.
pub struct UploadAndHandoff {
    storage: Arc<dyn StorageService>,
    payment: PaymentPage,
    state: watch::Sender<HandoffState>,
}

impl UploadAndHandoff {
    pub fn new(storage: Arc<dyn StorageService>, payment: PaymentPage) -> Self {
        let (state, _) = watch::channel(HandoffState::default());
        Self {
            storage,
            payment,
            state,
        }
    }

    pub fn state(&self) -> HandoffState {
        self.state.borrow().clone()
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<HandoffState> {
        self.state.subscribe()
    }

    /// Whether the submit action should be offered at all.
    pub fn available(&self, email: &str, has_image: bool) -> bool {
        has_image && is_valid_email(email) && !matches!(self.state(), HandoffState::Uploading)
    }

    /// Uploads `payload` and returns the payment page to navigate to.
    ///
    /// The URL is only built once the upload response names the file. On
    /// failure nothing is returned to navigate to and the state goes back to
    /// idle with the error recorded.
    pub async fn checkout(
        &self,
        email: &str,
        payload: Option<&EncodedPayload>,
    ) -> Result<Url, HueprintError> {
        if !is_valid_email(email) {
            return Err(HueprintError::InvalidEmail(email.to_string()));
        }
        let payload = payload.ok_or(HueprintError::NoImage)?;

        let claimed = self.state.send_if_modified(|state| {
            if matches!(state, HandoffState::Uploading) {
                return false;
            }
            *state = HandoffState::Uploading;
            true
        });
        if !claimed {
            return Err(HueprintError::CheckoutBusy);
        }
        let guard = UploadingGuard {
            state: &self.state,
            armed: true,
        };

        let ticket = UploadTicket::new();
        info!("Uploading image as {}", ticket.unique_id());

        let issued = self
            .storage
            .upload(payload, ticket.unique_id())
            .await
            .and_then(|file_name| ticket.issue(file_name));

        match issued {
            Ok(issued) => {
                info!(
                    "Upload {} stored as {}",
                    issued.unique_id, issued.server_file_name
                );
                let url = self.payment.redirect_url(email, issued);
                guard.finish(HandoffState::Redirected {
                    location: url.to_string(),
                });
                Ok(url)
            }
            Err(e) => {
                error!("Upload failed: {}", e);
                guard.finish(HandoffState::Idle {
                    last_error: Some(e.to_string()),
                });
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaType;
    use mockito::Matcher;

    const PAYMENT: &str = "https://pay.example.com/b/test_123";

    fn payload() -> EncodedPayload {
        EncodedPayload::encode(MediaType::Png, b"\x89PNG")
    }

    fn handoff(url: &str) -> UploadAndHandoff {
        UploadAndHandoff::new(
            Arc::new(HttpStorageService::new(url, Client::new())),
            PaymentPage::parse(PAYMENT).unwrap(),
        )
    }

    #[test]
    fn email_pattern() {
        for ok in ["a@b.co", "first.last@mail.example.org", "x+y@d.c"] {
            assert!(is_valid_email(ok), "{ok}");
        }
        for bad in [
            "", "plain", "@b.co", "a@", "a@b", "a@.co", "a@b.", "a b@c.de", "a@b@c.de", "a@b .co",
            "a\u{feff}@b.co", "a@b\u{3000}.co", "a\t@b.co",
        ] {
            assert!(!is_valid_email(bad), "{bad:?}");
        }
        // NEL is not whitespace to a browser pattern.
        assert!(is_valid_email("a\u{85}b@c.de"));
    }

    #[test]
    fn ticket_ids_are_fresh() {
        assert_ne!(UploadTicket::new().unique_id(), UploadTicket::new().unique_id());
    }

    #[test]
    fn empty_file_name_is_not_issued() {
        assert!(UploadTicket::new().issue(String::new()).is_err());
        assert!(UploadTicket::new().issue("  ".to_string()).is_err());
    }

    #[test]
    fn redirect_escapes_email() {
        let page = PaymentPage::parse(PAYMENT).unwrap();
        let ticket = UploadTicket::new().issue("abc-123.png".to_string()).unwrap();
        let url = page.redirect_url("me+you@example.com", ticket);
        assert_eq!(
            url.as_str(),
            "https://pay.example.com/b/test_123?prefilled_email=me%2Byou%40example.com&client_reference_id=abc-123.png"
        );
    }

    #[tokio::test]
    async fn upload_then_redirect() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/upload")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({"image": "iVBORw==", "contentType": "image/png"})),
                Matcher::Regex(r#""uniqueId":"[0-9a-f-]{36}""#.to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"fileName":"f-42.png"}"#)
            .create_async()
            .await;

        let handoff = handoff(&server.url());
        let url = handoff
            .checkout("user@example.com", Some(&payload()))
            .await
            .unwrap();

        assert_eq!(
            url.as_str(),
            "https://pay.example.com/b/test_123?prefilled_email=user%40example.com&client_reference_id=f-42.png"
        );
        assert_eq!(
            handoff.state(),
            HandoffState::Redirected {
                location: url.to_string()
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn network_failure_returns_to_idle() {
        let handoff = handoff("http://127.0.0.1:9");
        let result = handoff.checkout("user@example.com", Some(&payload())).await;

        assert!(matches!(result, Err(HueprintError::Transport(TransportError::Network(_)))));
        assert!(matches!(
            handoff.state(),
            HandoffState::Idle { last_error: Some(_) }
        ));
        assert!(handoff.available("user@example.com", true));
    }

    #[tokio::test]
    async fn missing_file_name_never_redirects() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/upload")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"key":"f-42.png"}"#)
            .create_async()
            .await;

        let handoff = handoff(&server.url());
        let result = handoff.checkout("user@example.com", Some(&payload())).await;
        assert!(matches!(result, Err(HueprintError::Transport(TransportError::Malformed(_)))));
        assert!(matches!(handoff.state(), HandoffState::Idle { .. }));
    }

    /// Storage that holds every upload until released.
    struct GatedStorage {
        gate: tokio::sync::Notify,
    }

    #[async_trait]
    impl StorageService for GatedStorage {
        async fn upload(&self, _payload: &EncodedPayload, unique_id: Uuid) -> Result<String, TransportError> {
            self.gate.notified().await;
            Ok(format!("{unique_id}.png"))
        }
    }

    #[tokio::test]
    async fn second_submit_while_uploading_is_rejected() {
        let storage = Arc::new(GatedStorage {
            gate: tokio::sync::Notify::new(),
        });
        let handoff = Arc::new(UploadAndHandoff::new(
            storage.clone(),
            PaymentPage::parse(PAYMENT).unwrap(),
        ));
        let mut rx = handoff.subscribe();

        let first = tokio::spawn({
            let handoff = Arc::clone(&handoff);
            async move { handoff.checkout("user@example.com", Some(&payload())).await }
        });
        rx.wait_for(|state| *state == HandoffState::Uploading)
            .await
            .unwrap();

        assert!(!handoff.available("user@example.com", true));
        assert!(matches!(
            handoff.checkout("user@example.com", Some(&payload())).await,
            Err(HueprintError::CheckoutBusy)
        ));

        storage.gate.notify_one();
        let url = first.await.unwrap().unwrap();
        assert!(url.query().unwrap().ends_with(".png"));
        assert!(matches!(*rx.borrow_and_update(), HandoffState::Redirected { .. }));
    }

    #[tokio::test]
    async fn dropped_checkout_returns_to_idle() {
        let storage = Arc::new(GatedStorage {
            gate: tokio::sync::Notify::new(),
        });
        let handoff = UploadAndHandoff::new(storage.clone(), PaymentPage::parse(PAYMENT).unwrap());

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            handoff.checkout("user@example.com", Some(&payload())),
        )
        .await;
        assert!(abandoned.is_err());

        assert_eq!(
            handoff.state(),
            HandoffState::Idle {
                last_error: Some(UPLOAD_CANCELLED.to_string())
            }
        );
        assert!(handoff.available("user@example.com", true));

        storage.gate.notify_one();
        handoff
            .checkout("user@example.com", Some(&payload()))
            .await
            .unwrap();
        assert!(matches!(handoff.state(), HandoffState::Redirected { .. }));
    }

    #[tokio::test]
    async fn preconditions_are_checked_before_uploading() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/upload")
            .expect(0)
            .create_async()
            .await;

        let handoff = handoff(&server.url());
        assert!(matches!(
            handoff.checkout("not-an-email", Some(&payload())).await,
            Err(HueprintError::InvalidEmail(_))
        ));
        assert!(matches!(
            handoff.checkout("user@example.com", None).await,
            Err(HueprintError::NoImage)
        ));
        assert!(!handoff.available("user@example.com", false));
        assert!(!handoff.available("user@", true));
        assert_eq!(handoff.state(), HandoffState::default());
        mock.assert_async().await;
    }
}
