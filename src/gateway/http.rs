//! HTTP client for the partner bank's JSON API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::{
    BankGateway, GatewayError, InquiryResult, PaymentReceipt, PaymentRequest,
    RemotePaymentStatus, VirtualAccount, VirtualAccountRequest,
};
use crate::models::bank::BankDestination;

/// Error body the bank sends with 4xx responses.
#[derive(Debug, Deserialize)]
struct BankErrorBody {
    code: String,
    message: String,
}

pub struct HttpBankGateway {
    client: Client,
    base_url: Url,
}

impl HttpBankGateway {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path)
            .map_err(|e| GatewayError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| GatewayError::Malformed(e.to_string()));
        }

        if status.is_client_error() {
            if let Ok(body) = response.json::<BankErrorBody>().await {
                return Err(GatewayError::Rejected {
                    code: body.code,
                    message: body.message,
                });
            }
        }
        Err(GatewayError::Status(status.as_u16()))
    }
}

fn transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(error.to_string())
    }
}

#[async_trait]
impl BankGateway for HttpBankGateway {
    async fn create_virtual_account(
        &self,
        request: &VirtualAccountRequest,
    ) -> Result<VirtualAccount, GatewayError> {
        let response = self
            .client
            .post(self.endpoint("virtual-accounts")?)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;
        Self::decode(response).await
    }

    async fn do_payment(&self, request: &PaymentRequest) -> Result<PaymentReceipt, GatewayError> {
        let response = self
            .client
            .post(self.endpoint("payments")?)
            .header("X-Client-Ref", &request.request_ref)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;
        Self::decode(response).await
    }

    async fn get_interbank_inquiry(
        &self,
        destination: &BankDestination,
    ) -> Result<InquiryResult, GatewayError> {
        let response = self
            .client
            .post(self.endpoint("inquiries")?)
            .json(destination)
            .send()
            .await
            .map_err(transport_error)?;
        Self::decode(response).await
    }

    async fn get_payment_status(
        &self,
        request_ref: &str,
    ) -> Result<RemotePaymentStatus, GatewayError> {
        let response = self
            .client
            .get(self.endpoint(&format!("payments/{request_ref}"))?)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(RemotePaymentStatus::NotFound);
        }
        Self::decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_join_base_path() {
        let gateway = HttpBankGateway::new(
            Url::parse("https://bank.example.com/api/v2/").unwrap(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            gateway.endpoint("payments/WL1").unwrap().as_str(),
            "https://bank.example.com/api/v2/payments/WL1"
        );
    }

    #[test]
    fn test_remote_status_wire_format() {
        let settled: RemotePaymentStatus =
            serde_json::from_str(r#"{"status":"SETTLED","bank_ref":"BR-1"}"#).unwrap();
        assert_eq!(
            settled,
            RemotePaymentStatus::Settled {
                bank_ref: "BR-1".into()
            }
        );
        let pending: RemotePaymentStatus =
            serde_json::from_str(r#"{"status":"PENDING"}"#).unwrap();
        assert_eq!(pending, RemotePaymentStatus::Pending);
    }

    #[test]
    fn test_inquiry_wire_format() {
        let found: InquiryResult = serde_json::from_str(
            r#"{
                "bank_code": "014",
                "bank_name": "BANK CENTRAL ASIA",
                "account_no": "1234567890",
                "account_name": "BUDI SANTOSO",
                "transfer_ref": "INQ-77"
            }"#,
        )
        .unwrap();
        assert_eq!(found.bank_name, "BANK CENTRAL ASIA");
        assert_eq!(found.transfer_ref, "INQ-77");
    }
}
