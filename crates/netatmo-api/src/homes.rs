// Home topology and live status endpoints

use serde_json::json;
use tracing::debug;

use crate::client::{Endpoint, NetatmoClient};
use crate::error::Error;
use crate::ids::HomeId;
use crate::models::{HomeStatus, HomeStatusBody, HomesData};

const HOMES_DATA_PATH: &str = "api/homesdata";
const HOME_STATUS_PATH: &str = "api/homestatus";

impl NetatmoClient {
    /// Static topology of every home on the account.
    ///
    /// `POST api/homesdata`
    pub async fn homes_data(&self) -> Result<HomesData, Error> {
        let resp = self
            .post_api::<HomesData>(
                HOMES_DATA_PATH,
                &json!({ "sync_measurements": true }),
                Endpoint::Read,
            )
            .await?;
        resp.body
            .ok_or_else(|| Error::malformed("homesdata response without body", ""))
    }

    /// Live state of one home.
    ///
    /// `POST api/homestatus`. An offline installation answers without a
    /// `body` (or with an empty one); that yields [`HomeStatus::empty`].
    pub async fn home_status(&self, home_id: &HomeId) -> Result<HomeStatus, Error> {
        let resp = self
            .post_api::<serde_json::Value>(
                HOME_STATUS_PATH,
                &json!({ "home_id": home_id }),
                Endpoint::Read,
            )
            .await?;

        let body = match resp.body {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::Object(map)) if map.is_empty() => None,
            Some(other) => Some(other),
        };
        let Some(body) = body else {
            debug!(%home_id, "home is offline, no status body");
            return Ok(HomeStatus::empty(*home_id));
        };

        let raw = body.to_string();
        let parsed: HomeStatusBody = serde_json::from_value(body)
            .map_err(|e| Error::malformed(format!("homestatus body: {e}"), &raw))?;
        Ok(parsed.home)
    }
}
