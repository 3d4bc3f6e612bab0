use anyhow::{anyhow, Context, Result};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, Response,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.anon_key).context("Invalid Supabase anon key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .context("Invalid bearer token")?,
            );
        }

        Ok(headers)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => anyhow!("Authentication error: {}", error_text),
                404 => anyhow!("Resource not found: {}", error_text),
                409 => anyhow!("Conflict: {}", error_text),
                _ => anyhow!("API error ({}): {}", status, error_text),
            });
        }

        Ok(response)
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        headers: Option<HeaderMap>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send(method, path, auth_token, body, headers).await?;
        let data = response.json::<T>().await?;
        Ok(data)
    }

    pub async fn select<T>(&self, path: &str, auth_token: Option<&str>) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.request(Method::GET, path, auth_token, None).await
    }

    pub async fn select_one<T>(&self, path: &str, auth_token: Option<&str>) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let rows: Vec<T> = self.select(path, auth_token).await?;
        Ok(rows.into_iter().next())
    }

    /// Inserts into `table` and returns the stored representation.
    pub async fn insert<T>(&self, table: &str, body: Value, auth_token: Option<&str>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/{}", table);
        let rows: Vec<T> = self
            .request_with_headers(Method::POST, &path, auth_token, Some(body), Some(representation()))
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| anyhow!("Insert into {} returned no rows", table))
    }

    pub async fn update<T>(&self, path: &str, body: Value, auth_token: Option<&str>) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(Method::PATCH, path, auth_token, Some(body), Some(representation()))
            .await
    }

    pub async fn delete(&self, path: &str, auth_token: Option<&str>) -> Result<()> {
        self.send(Method::DELETE, path, auth_token, None, None).await?;
        Ok(())
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

fn representation() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> SupabaseClient {
        let config = AppConfig {
            supabase_url: server.uri(),
            supabase_anon_key: "anon".to_string(),
            supabase_jwt_secret: "secret".to_string(),
            server_port: 3000,
            scheduling: Default::default(),
            payments: Default::default(),
        };
        SupabaseClient::new(&config)
    }

    #[tokio::test]
    async fn select_forwards_token_and_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/doctors"))
            .and(query_param("id", "eq.42"))
            .and(header("apikey", "anon"))
            .and(header("authorization", "Bearer user-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 42}])))
            .mount(&server)
            .await;

        let rows: Vec<Value> = client_for(&server)
            .select("/rest/v1/doctors?id=eq.42", Some("user-token"))
            .await
            .unwrap();

        assert_eq!(rows, vec![json!({"id": 42})]);
    }

    #[tokio::test]
    async fn insert_asks_for_representation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/patients"))
            .and(header("prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": 1}])))
            .mount(&server)
            .await;

        let row: Value = client_for(&server)
            .insert("patients", json!({"first_name": "Ada"}), None)
            .await
            .unwrap();

        assert_eq!(row["id"], 1);
    }

    #[tokio::test]
    async fn error_status_becomes_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/doctors"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .select::<Value>("/rest/v1/doctors", None)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Authentication error"));
    }

    #[tokio::test]
    async fn delete_ignores_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/doctor_unavailabilities"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        client_for(&server)
            .delete("/rest/v1/doctor_unavailabilities?id=eq.1", None)
            .await
            .unwrap();
    }
}
