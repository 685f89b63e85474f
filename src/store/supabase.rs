//! Supabase storage over its PostgREST endpoint (`/rest/v1`).
//!
//! Rows are filtered with PostgREST operators (`user_id=eq.<id>`), writes ask
//! for `Prefer: return=representation` so the stored row comes back in the
//! same round trip.

use async_trait::async_trait;
use boardroom_common::{History, HistoryQuery, Member, MemberPatch, NewHistory, NewMember, Picture};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use super::Store;
use crate::errors::StoreError;

const MEMBERS: &str = "members";
const HISTORY: &str = "history";
const PICTURES: &str = "pictures";

pub struct SupabaseStore {
    rest_url: String,
    service_key: String,
    client: reqwest::Client,
}

impl SupabaseStore {
    /// `url` is the project URL (`https://<ref>.supabase.co`).
    pub fn new(url: &str, service_key: &str) -> Self {
        Self {
            rest_url: format!("{}/rest/v1", url.trim_end_matches('/')),
            service_key: service_key.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.rest_url, table))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    fn returning(&self, method: Method, table: &str) -> RequestBuilder {
        self.request(method, table)
            .header("Prefer", "return=representation")
    }

    async fn rows<T: DeserializeOwned>(request: RequestBuilder) -> Result<Vec<T>, StoreError> {
        let response = checked(request.send().await?).await?;
        let rows = response.json::<Vec<T>>().await?;
        Ok(rows)
    }

    async fn first_row<T: DeserializeOwned>(
        request: RequestBuilder,
        table: &str,
    ) -> Result<T, StoreError> {
        Self::rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode(format!("insert into {} returned no row", table)))
    }
}

async fn checked(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), body = %body, "Supabase request failed");
    Err(StoreError::Upstream {
        status: status.as_u16(),
        body,
    })
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

#[async_trait]
impl Store for SupabaseStore {
    fn backend(&self) -> &'static str {
        "supabase"
    }

    async fn list_members(&self, user_id: &str) -> Result<Vec<Member>, StoreError> {
        Self::rows(self.request(Method::GET, MEMBERS).query(&[
            ("select", "*".to_string()),
            ("user_id", eq(user_id)),
            ("order", "created_at.asc".to_string()),
        ]))
        .await
    }

    async fn get_member(&self, id: &str) -> Result<Option<Member>, StoreError> {
        let rows: Vec<Member> = Self::rows(
            self.request(Method::GET, MEMBERS)
                .query(&[("select", "*".to_string()), ("id", eq(id))]),
        )
        .await?;
        Ok(rows.into_iter().next())
    }

    async fn create_member(&self, member: NewMember) -> Result<Member, StoreError> {
        Self::first_row(self.returning(Method::POST, MEMBERS).json(&[member]), MEMBERS).await
    }

    async fn update_member(
        &self,
        id: &str,
        patch: MemberPatch,
    ) -> Result<Option<Member>, StoreError> {
        if patch.is_empty() {
            return self.get_member(id).await;
        }
        let rows: Vec<Member> = Self::rows(
            self.returning(Method::PATCH, MEMBERS)
                .query(&[("id", eq(id))])
                .json(&patch),
        )
        .await?;
        Ok(rows.into_iter().next())
    }

    async fn delete_member(&self, id: &str) -> Result<bool, StoreError> {
        let rows: Vec<Member> = Self::rows(
            self.returning(Method::DELETE, MEMBERS)
                .query(&[("id", eq(id))]),
        )
        .await?;
        Ok(!rows.is_empty())
    }

    async fn insert_history(&self, entry: NewHistory) -> Result<History, StoreError> {
        Self::first_row(self.returning(Method::POST, HISTORY).json(&[entry]), HISTORY).await
    }

    async fn get_history(&self, id: &str) -> Result<Option<History>, StoreError> {
        let rows: Vec<History> = Self::rows(
            self.request(Method::GET, HISTORY)
                .query(&[("select", "*".to_string()), ("id", eq(id))]),
        )
        .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_history(&self, query: &HistoryQuery) -> Result<Vec<History>, StoreError> {
        let mut params = vec![
            ("select", "*".to_string()),
            ("user_id", eq(&query.user_id)),
            ("order", "created_at.desc".to_string()),
            ("limit", query.effective_limit().to_string()),
        ];
        if let Some(member_id) = &query.member_id {
            params.push(("member_id", eq(member_id)));
        }
        let mut rows: Vec<History> =
            Self::rows(self.request(Method::GET, HISTORY).query(&params)).await?;
        rows.reverse();
        Ok(rows)
    }

    async fn list_pictures(&self) -> Result<Vec<Picture>, StoreError> {
        Self::rows(self.request(Method::GET, PICTURES).query(&[
            ("select", "*"),
            ("order", "created_at.asc"),
        ]))
        .await
    }
}
