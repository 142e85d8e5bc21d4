//! # HTTP Tally Gateway
//!
//! [`TallyGateway`] over Tally's built-in HTTP server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::TallySettings;
use crate::error::{SyncError, SyncResult};
use crate::tally::xml::{self, truncate};
use crate::tally::{ClosingBalance, ImportOutcome, OutboundVoucher, TallyGateway, TallyVoucher};

#[derive(Debug, Clone)]
pub struct HttpTallyGateway {
    http: Client,
    base_url: String,
    company: Option<String>,
    probe_timeout: Duration,
    request_timeout: Duration,
}

impl HttpTallyGateway {
    pub fn new(settings: &TallySettings) -> SyncResult<Self> {
        url::Url::parse(&settings.url)?;

        let http = Client::builder()
            .connect_timeout(settings.probe_timeout())
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(HttpTallyGateway {
            http,
            base_url: settings.url.trim_end_matches('/').to_string(),
            company: settings.company.clone(),
            probe_timeout: settings.probe_timeout(),
            request_timeout: settings.request_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POSTs an XML envelope and returns the body of a 2xx response.
    async fn post_xml(&self, body: String) -> SyncResult<String> {
        let resp = self
            .http
            .post(&self.base_url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=utf-8")
            .timeout(self.request_timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e, self.request_timeout))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| self.transport_error(e, self.request_timeout))?;

        if !status.is_success() {
            return Err(SyncError::TallyHttpStatus {
                status: status.as_u16(),
                body: truncate(&text, 200).to_string(),
            });
        }
        Ok(text)
    }

    fn transport_error(&self, err: reqwest::Error, limit: Duration) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(limit.as_secs())
        } else {
            SyncError::from(err)
        }
    }
}

#[async_trait]
impl TallyGateway for HttpTallyGateway {
    async fn ping(&self) -> SyncResult<()> {
        let resp = self
            .http
            .get(&self.base_url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e, self.probe_timeout))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| self.transport_error(e, self.probe_timeout))?;

        if !status.is_success() {
            return Err(SyncError::TallyHttpStatus {
                status: status.as_u16(),
                body: truncate(&body, 200).to_string(),
            });
        }
        if !body.to_lowercase().contains("running") {
            return Err(SyncError::MalformedResponse(format!(
                "not a Tally server: {}",
                truncate(body.trim(), 80)
            )));
        }
        Ok(())
    }

    async fn import_voucher(&self, voucher: &OutboundVoucher) -> SyncResult<ImportOutcome> {
        let request = xml::import_voucher_request(voucher, self.company.as_deref());
        let body = self.post_xml(request).await?;
        let outcome = xml::parse_import_response(&body, &voucher.remote_id)?;

        debug!(
            remote_id = %voucher.remote_id,
            created = outcome.created,
            altered = outcome.altered,
            "Tally import accepted"
        );
        Ok(outcome)
    }

    async fn export_vouchers_since(&self, alter_id: i64) -> SyncResult<Vec<TallyVoucher>> {
        let request = xml::export_vouchers_request(alter_id, self.company.as_deref());
        let body = self.post_xml(request).await?;
        xml::parse_vouchers(&body)
    }

    async fn export_closing_balances(&self) -> SyncResult<Vec<ClosingBalance>> {
        let request = xml::export_closing_balances_request(self.company.as_deref());
        let body = self.post_xml(request).await?;
        let balances = xml::parse_closing_balances(&body)?;
        if balances.is_empty() {
            warn!("Tally returned no stock items");
        }
        Ok(balances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use httpmock::prelude::*;
    use ironmart_core::{Money, SyncEntityType};

    use crate::tally::OutboundLine;

    fn gateway(server: &MockServer) -> HttpTallyGateway {
        let settings = TallySettings {
            url: server.base_url(),
            company: Some("IronMart Industrial".into()),
            probe_timeout_secs: 1,
            request_timeout_secs: 1,
            ..Default::default()
        };
        HttpTallyGateway::new(&settings).unwrap()
    }

    fn voucher() -> OutboundVoucher {
        OutboundVoucher {
            entity_type: SyncEntityType::Order,
            remote_id: "IM-ORD-7".into(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            voucher_number: "ORD-1007".into(),
            party_ledger: "Marketplace Customers".into(),
            ledger: "Sales".into(),
            narration: String::new(),
            lines: vec![OutboundLine {
                stock_item: "Hex Bolt M8".into(),
                quantity: 2,
                rate: Money::from_paise(1_000),
            }],
        }
    }

    #[tokio::test]
    async fn test_ping_requires_running_banner() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/");
                then.status(200)
                    .body("<RESPONSE>TallyPrime Server is Running</RESPONSE>");
            })
            .await;

        assert!(gateway(&server).ping().await.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_ping_rejects_other_servers() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/");
                then.status(200).body("<html>router login</html>");
            })
            .await;

        assert!(matches!(
            gateway(&server).ping().await,
            Err(SyncError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_import_posts_envelope() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/")
                    .body_contains("REMOTEID=\"IM-ORD-7\"")
                    .body_contains("<SVCURRENTCOMPANY>IronMart Industrial</SVCURRENTCOMPANY>");
                then.status(200).body(
                    "<RESPONSE><CREATED>1</CREATED><ALTERED>0</ALTERED>\
                     <LASTVCHID>88</LASTVCHID><ERRORS>0</ERRORS></RESPONSE>",
                );
            })
            .await;

        let outcome = gateway(&server).import_voucher(&voucher()).await.unwrap();
        assert_eq!(outcome.voucher_id.as_deref(), Some("88"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/");
                then.status(500).body("internal");
            })
            .await;

        match gateway(&server).export_closing_balances().await {
            Err(SyncError::TallyHttpStatus { status, .. }) => assert_eq!(status, 500),
            other => panic!("expected HTTP status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_tally_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/");
                then.status(200)
                    .delay(Duration::from_secs(3))
                    .body("<ENVELOPE/>");
            })
            .await;

        let err = gateway(&server).export_vouchers_since(0).await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {:?}", err);
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_error() {
        let settings = TallySettings {
            url: "http://127.0.0.1:9".into(),
            probe_timeout_secs: 1,
            ..Default::default()
        };
        let err = HttpTallyGateway::new(&settings).unwrap().ping().await.unwrap_err();
        assert!(err.is_transport());
    }
}
