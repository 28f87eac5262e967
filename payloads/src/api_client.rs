use crate::{BlockId, BookingId, UserId, requests, responses};
use reqwest::StatusCode;
use serde::Serialize;

type ReqwestResult = Result<reqwest::Response, reqwest::Error>;

/// An API client for interfacing with the backend.
pub struct APIClient {
    pub address: String,
    pub inner_client: reqwest::Client,
}

/// Helper methods for http actions
impl APIClient {
    fn format_url(&self, path: &str) -> String {
        format!("{}/api/{path}", &self.address)
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> ReqwestResult {
        self.inner_client
            .post(self.format_url(path))
            .json(body)
            .send()
            .await
    }

    async fn empty_post(&self, path: &str) -> ReqwestResult {
        self.inner_client.post(self.format_url(path)).send().await
    }

    async fn empty_get(&self, path: &str) -> ReqwestResult {
        self.inner_client.get(self.format_url(path)).send().await
    }
}

/// Methods on the backend API
impl APIClient {
    pub async fn health_check(&self) -> Result<(), ClientError> {
        let response = self.empty_get("health_check").await?;
        ok_empty(response).await
    }

    /// Sign in by email. Only available on servers built with `mock-auth`.
    pub async fn test_login(
        &self,
        details: &requests::TestLogin,
    ) -> Result<(), ClientError> {
        let response = self.post("test_login", details).await?;
        ok_empty(response).await
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        let response = self.empty_post("logout").await?;
        ok_empty(response).await
    }

    /// Get the current user's profile information.
    pub async fn user_profile(
        &self,
    ) -> Result<responses::UserProfile, ClientError> {
        let response = self.empty_get("user_profile").await?;
        ok_body(response).await
    }

    pub async fn list_courts(
        &self,
    ) -> Result<Vec<responses::Court>, ClientError> {
        let response = self.empty_get("courts").await?;
        ok_body(response).await
    }

    pub async fn list_slots(
        &self,
        query: &requests::SlotQuery,
    ) -> Result<Vec<responses::Slot>, ClientError> {
        let response = self.post("slots", query).await?;
        ok_body(response).await
    }

    pub async fn create_booking(
        &self,
        details: &requests::CreateBooking,
    ) -> Result<responses::CreatedBooking, ClientError> {
        let response = self.post("create_booking", details).await?;
        ok_body(response).await
    }

    pub async fn my_bookings(
        &self,
    ) -> Result<Vec<responses::Booking>, ClientError> {
        let response = self.empty_get("my_bookings").await?;
        ok_body(response).await
    }

    pub async fn cancel_booking(
        &self,
        booking_id: &BookingId,
    ) -> Result<responses::SuccessMessage, ClientError> {
        let response = self.post("cancel_booking", booking_id).await?;
        ok_body(response).await
    }

    /// Follow a confirmation link from an invitation email.
    pub async fn confirm(
        &self,
        token: &str,
    ) -> Result<responses::ConfirmationResult, ClientError> {
        let response = self.empty_get(&format!("confirm/{token}")).await?;
        ok_body(response).await
    }

    pub async fn cancellation_banners(
        &self,
    ) -> Result<Vec<responses::Banner>, ClientError> {
        let response = self.empty_get("cancellation_banners").await?;
        ok_body(response).await
    }
}

/// Administrator-only methods
impl APIClient {
    pub async fn create_blocks(
        &self,
        details: &requests::CreateBlocks,
    ) -> Result<responses::BlockCreationResult, ClientError> {
        let response = self.post("admin/create_blocks", details).await?;
        ok_body(response).await
    }

    pub async fn list_blocks(
        &self,
    ) -> Result<Vec<responses::Block>, ClientError> {
        let response = self.empty_get("admin/blocks").await?;
        ok_body(response).await
    }

    pub async fn delete_block(
        &self,
        block_id: &BlockId,
    ) -> Result<(), ClientError> {
        let response = self.post("admin/delete_block", block_id).await?;
        ok_empty(response).await
    }

    pub async fn admin_cancel_booking(
        &self,
        details: &requests::AdminCancelBooking,
    ) -> Result<responses::SuccessMessage, ClientError> {
        let response = self.post("admin/cancel_booking", details).await?;
        ok_body(response).await
    }

    pub async fn admin_bookings(
        &self,
        details: &requests::AdminBookings,
    ) -> Result<Vec<responses::AdminBooking>, ClientError> {
        let response = self.post("admin/bookings", details).await?;
        ok_body(response).await
    }

    pub async fn booking_participants(
        &self,
        booking_id: &BookingId,
    ) -> Result<Vec<String>, ClientError> {
        let response =
            self.post("admin/booking_participants", booking_id).await?;
        ok_body(response).await
    }

    pub async fn list_users(
        &self,
    ) -> Result<Vec<responses::UserSummary>, ClientError> {
        let response = self.empty_get("admin/users").await?;
        ok_body(response).await
    }

    pub async fn update_user(
        &self,
        details: &requests::UpdateUser,
    ) -> Result<(), ClientError> {
        let response = self.post("admin/update_user", details).await?;
        ok_empty(response).await
    }

    pub async fn list_admins(
        &self,
    ) -> Result<Vec<responses::UserSummary>, ClientError> {
        let response = self.empty_get("admin/admins").await?;
        ok_body(response).await
    }

    pub async fn add_admin(
        &self,
        details: &requests::AddAdmin,
    ) -> Result<(), ClientError> {
        let response = self.post("admin/add_admin", details).await?;
        ok_empty(response).await
    }

    pub async fn remove_admin(
        &self,
        user_id: &UserId,
    ) -> Result<(), ClientError> {
        let response = self.post("admin/remove_admin", user_id).await?;
        ok_empty(response).await
    }

    pub async fn audit(
        &self,
    ) -> Result<Vec<responses::CancellationRecord>, ClientError> {
        let response = self.empty_get("admin/audit").await?;
        ok_body(response).await
    }

    pub async fn admin_stats(
        &self,
    ) -> Result<responses::AdminStats, ClientError> {
        let response = self.empty_get("admin/stats").await?;
        ok_body(response).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An unhandled API error to display, containing response text.
    #[error("{1}")]
    APIError(StatusCode, String),
    #[error("Network error. Please check your connection.")]
    Network(#[from] reqwest::Error),
}

/// Deserialize a successful request into the desired type, or return an
/// appropriate error.
pub async fn ok_body<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    if !response.status().is_success() {
        return Err(ClientError::APIError(
            response.status(),
            response.text().await?,
        ));
    }
    Ok(response.json::<T>().await?)
}

/// Check that an empty response is OK, returning a ClientError if not.
pub async fn ok_empty(response: reqwest::Response) -> Result<(), ClientError> {
    if !response.status().is_success() {
        return Err(ClientError::APIError(
            response.status(),
            response.text().await?,
        ));
    }
    Ok(())
}
