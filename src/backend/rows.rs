//! Row operations: per-table query builders
//!
//! Covers the filter surface the data layer actually uses: equality,
//! ordering, limits, and single-row-or-error fetches.

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};

use crate::backend::CLIENT_INFO;
use crate::error::Error;
use crate::fetch::{Fetch, FetchBuilder};

/// Client for row operations on one table
pub struct RowsClient {
    /// Full REST URL for the table
    url: String,
    /// The anonymous API key
    key: String,
    /// Bearer token of the current session, if any
    token: Option<String>,
    /// HTTP client
    client: Client,
}

impl RowsClient {
    pub(crate) fn new(
        base_url: &str,
        key: &str,
        table: &str,
        client: Client,
        token: Option<String>,
    ) -> Self {
        Self {
            url: format!("{}/rest/v1/{}", base_url, table),
            key: key.to_string(),
            token,
            client,
        }
    }

    /// Select specific columns from the table
    pub fn select(&self, columns: &str) -> SelectQuery {
        let mut query = SelectQuery {
            url: self.url.clone(),
            key: self.key.clone(),
            token: self.token.clone(),
            client: self.client.clone(),
            params: Vec::new(),
        };
        query.params.push(("select".to_string(), columns.to_string()));
        query
    }

    /// Insert a row into the table
    pub fn insert<T: Serialize>(&self, values: T) -> InsertQuery<T> {
        InsertQuery {
            url: self.url.clone(),
            key: self.key.clone(),
            token: self.token.clone(),
            client: self.client.clone(),
            values,
        }
    }

    /// Update rows in the table
    pub fn update<T: Serialize>(&self, values: T) -> UpdateQuery<T> {
        UpdateQuery {
            url: self.url.clone(),
            key: self.key.clone(),
            token: self.token.clone(),
            client: self.client.clone(),
            values,
            params: Vec::new(),
        }
    }

    /// Delete rows from the table
    pub fn delete(&self) -> DeleteQuery {
        DeleteQuery {
            url: self.url.clone(),
            key: self.key.clone(),
            token: self.token.clone(),
            client: self.client.clone(),
            params: Vec::new(),
        }
    }
}

fn base_request<'a>(
    builder: FetchBuilder<'a>,
    key: &str,
    token: &Option<String>,
) -> FetchBuilder<'a> {
    let builder = builder.header("apikey", key).header("X-Client-Info", CLIENT_INFO);
    match token {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}

fn apply_params<'a>(mut builder: FetchBuilder<'a>, params: &[(String, String)]) -> FetchBuilder<'a> {
    for (key, value) in params {
        builder = builder.query_param(key, value);
    }
    builder
}

/// Builder for SELECT queries
pub struct SelectQuery {
    url: String,
    key: String,
    token: Option<String>,
    client: Client,
    params: Vec<(String, String)>,
}

impl SelectQuery {
    /// Filter rows where column equals a value (exact, case-sensitive)
    pub fn eq<T: ToString>(mut self, column: &str, value: T) -> Self {
        self.params
            .push((column.to_string(), format!("eq.{}", value.to_string())));
        self
    }

    /// Order the results by a column
    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.params
            .push(("order".to_string(), format!("{}.{}", column, direction)));
        self
    }

    /// Limit the number of rows returned
    pub fn limit(mut self, count: u32) -> Self {
        self.params.push(("limit".to_string(), count.to_string()));
        self
    }

    /// Execute the query and return all matching rows
    pub async fn fetch<T: DeserializeOwned>(self) -> Result<Vec<T>, Error> {
        let builder = base_request(Fetch::get(&self.client, &self.url), &self.key, &self.token);
        let builder = apply_params(builder, &self.params);
        builder.execute::<Vec<T>>().await
    }

    /// Execute the query and return the first row, if any
    pub async fn fetch_optional<T: DeserializeOwned>(self) -> Result<Option<T>, Error> {
        let rows = self.limit(1).fetch::<T>().await?;
        Ok(rows.into_iter().next())
    }

    /// Execute the query and return exactly one row, or an error
    pub async fn fetch_one<T: DeserializeOwned>(self) -> Result<T, Error> {
        let url = self.url.clone();
        self.fetch_optional::<T>()
            .await?
            .ok_or_else(|| Error::database(format!("no rows returned from {}", url)))
    }
}

/// Builder for INSERT queries
pub struct InsertQuery<T: Serialize> {
    url: String,
    key: String,
    token: Option<String>,
    client: Client,
    values: T,
}

impl<T: Serialize> InsertQuery<T> {
    /// Execute the insert and return the created row
    pub async fn fetch_one<R: DeserializeOwned>(self) -> Result<R, Error> {
        let builder = base_request(Fetch::post(&self.client, &self.url), &self.key, &self.token)
            .header("Prefer", "return=representation")
            .json(&self.values)?;
        let mut rows = builder.execute::<Vec<R>>().await?;
        if rows.is_empty() {
            return Err(Error::database(format!("insert into {} returned no rows", self.url)));
        }
        Ok(rows.remove(0))
    }

    /// Execute the insert without returning the created row
    pub async fn send(self) -> Result<(), Error> {
        base_request(Fetch::post(&self.client, &self.url), &self.key, &self.token)
            .header("Prefer", "return=minimal")
            .json(&self.values)?
            .send()
            .await
    }
}

/// Builder for UPDATE queries
pub struct UpdateQuery<T: Serialize> {
    url: String,
    key: String,
    token: Option<String>,
    client: Client,
    values: T,
    params: Vec<(String, String)>,
}

impl<T: Serialize> UpdateQuery<T> {
    /// Filter rows where column equals a value
    pub fn eq<V: ToString>(mut self, column: &str, value: V) -> Self {
        self.params
            .push((column.to_string(), format!("eq.{}", value.to_string())));
        self
    }

    /// Execute the update without returning the changed rows
    pub async fn send(self) -> Result<(), Error> {
        let builder = base_request(Fetch::patch(&self.client, &self.url), &self.key, &self.token)
            .header("Prefer", "return=minimal")
            .json(&self.values)?;
        apply_params(builder, &self.params).send().await
    }
}

/// Builder for DELETE queries
pub struct DeleteQuery {
    url: String,
    key: String,
    token: Option<String>,
    client: Client,
    params: Vec<(String, String)>,
}

impl DeleteQuery {
    /// Filter rows where column equals a value
    pub fn eq<V: ToString>(mut self, column: &str, value: V) -> Self {
        self.params
            .push((column.to_string(), format!("eq.{}", value.to_string())));
        self
    }

    /// Execute the delete without returning the removed rows
    pub async fn send(self) -> Result<(), Error> {
        let builder = base_request(Fetch::delete(&self.client, &self.url), &self.key, &self.token);
        apply_params(builder, &self.params).send().await
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::Backend;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn select_with_filters_and_order() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/widgets"))
            .and(query_param("select", "*"))
            .and(query_param("profile_id", "eq.user-1"))
            .and(query_param("order", "position.asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 1, "position": 0 },
                { "id": 2, "position": 1 }
            ])))
            .mount(&mock_server)
            .await;

        let backend = Backend::new(&mock_server.uri(), "fake-key");
        let rows = backend
            .rows("widgets")
            .select("*")
            .eq("profile_id", "user-1")
            .order("position", true)
            .fetch::<serde_json::Value>()
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], 1);
    }

    #[tokio::test]
    async fn fetch_optional_is_none_on_empty_result() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("username", "eq.alexdev"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let backend = Backend::new(&mock_server.uri(), "fake-key");
        let row = backend
            .rows("profiles")
            .select("*")
            .eq("username", "alexdev")
            .fetch_optional::<serde_json::Value>()
            .await
            .unwrap();

        assert!(row.is_none());
    }

    #[tokio::test]
    async fn fetch_one_errors_on_empty_result() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let backend = Backend::new(&mock_server.uri(), "fake-key");
        let result = backend
            .rows("profiles")
            .select("*")
            .eq("id", "missing")
            .fetch_one::<serde_json::Value>()
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn insert_returns_created_row() {
        let mock_server = MockServer::start().await;

        let payload = json!({ "profile_id": "user-1", "type": "social", "size": "1x1", "position": 3 });
        Mock::given(method("POST"))
            .and(path("/rest/v1/widgets"))
            .and(header("Prefer", "return=representation"))
            .and(body_json(&payload))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([
                { "id": 42, "profile_id": "user-1", "type": "social", "size": "1x1", "position": 3 }
            ])))
            .mount(&mock_server)
            .await;

        let backend = Backend::new(&mock_server.uri(), "fake-key");
        let created = backend
            .rows("widgets")
            .insert(&payload)
            .fetch_one::<serde_json::Value>()
            .await
            .unwrap();

        assert_eq!(created["id"], 42);
    }

    #[tokio::test]
    async fn update_and_delete_filter_by_id() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/widgets"))
            .and(query_param("id", "eq.42"))
            .and(body_json(json!({ "position": 5 })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/rest/v1/widgets"))
            .and(query_param("id", "eq.42"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let backend = Backend::new(&mock_server.uri(), "fake-key");
        backend
            .rows("widgets")
            .update(json!({ "position": 5 }))
            .eq("id", 42)
            .send()
            .await
            .unwrap();
        backend.rows("widgets").delete().eq("id", 42).send().await.unwrap();
    }
}
