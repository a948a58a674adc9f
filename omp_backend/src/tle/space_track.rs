//! space-track.org client.
//!
//! Catalogue numbers are collected with [`SpaceTrack::add_id`] and fetched
//! in batches of [`MAX_REQUEST`], pausing [`REQUEST_DELAY`] between batches
//! as the service asks of API clients.

use log::warn;
use std::collections::BTreeSet;
use std::time::Duration;

use super::TleError;

/// Login endpoint; the session cookie it sets authorizes queries.
pub const LOGIN_URL: &str = "https://www.space-track.org/ajaxauth/login";

/// Latest element set query, to be followed by comma-separated catalogue ids.
pub const QUERY_URL: &str =
    "https://www.space-track.org/basicspacedata/query/class/tle_latest/ORDINAL/1/NORAD_CAT_ID/";

const QUERY_SUFFIX: &str = "/orderby/EPOCH desc/format/tle";

/// Catalogue ids per request.
pub const MAX_REQUEST: usize = 20;

/// Pause between consecutive requests.
pub const REQUEST_DELAY: Duration = Duration::from_secs(5);

/// Accumulates catalogue numbers and retrieves their element sets.
#[derive(Debug, Clone)]
pub struct SpaceTrack {
    ids: Vec<String>,
    max_request: usize,
    request_delay: Duration,
}

impl Default for SpaceTrack {
    fn default() -> Self {
        Self::new()
    }
}

impl SpaceTrack {
    pub fn new() -> Self {
        Self {
            ids: Vec::new(),
            max_request: MAX_REQUEST,
            request_delay: REQUEST_DELAY,
        }
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Queue a catalogue number (at most five digits).
    pub fn add_id(&mut self, catid: impl ToString) -> Result<(), TleError> {
        let catid = catid.to_string();
        let trimmed = catid.trim();
        if trimmed.is_empty() || trimmed.len() > 5 || !trimmed.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(TleError::InvalidCatalogueId(catid));
        }
        self.ids.push(trimmed.to_string());
        Ok(())
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Query URL for a batch of catalogue numbers. Leading zeros are
    /// dropped, duplicates removed and the numbers sorted.
    pub fn build_request(ids: &[String]) -> Result<String, TleError> {
        let numbers = ids
            .iter()
            .map(|id| {
                id.trim()
                    .parse::<u32>()
                    .map_err(|_| TleError::InvalidCatalogueId(id.clone()))
            })
            .collect::<Result<BTreeSet<_>, _>>()?;

        let list = numbers
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        Ok(format!("{}{}{}", QUERY_URL, list, QUERY_SUFFIX))
    }

    /// Request URLs for all queued ids, one per batch.
    pub fn requests(&self) -> Result<Vec<String>, TleError> {
        self.ids
            .chunks(self.max_request)
            .map(Self::build_request)
            .collect()
    }

    /// Group response lines into (line 1, line 2) pairs, skipping blank
    /// lines. A trailing unpaired line is dropped.
    pub fn pair_lines<S: AsRef<str>>(lines: &[S]) -> Vec<(String, String)> {
        let lines: Vec<&str> = lines
            .iter()
            .map(|l| l.as_ref().trim_end())
            .filter(|l| !l.is_empty())
            .collect();

        let mut chunks = lines.chunks_exact(2);
        let pairs = chunks
            .by_ref()
            .map(|pair| (pair[0].to_string(), pair[1].to_string()))
            .collect();
        if let [line] = chunks.remainder() {
            warn!("Ignoring unpaired TLE line: {}", line);
        }
        pairs
    }

    /// Log in and fetch the latest element sets for all queued ids.
    ///
    /// Returns the raw response lines.
    #[cfg(feature = "space-track")]
    pub async fn send_request(
        &self,
        credentials: &crate::config::SpaceTrackSettings,
    ) -> crate::error::OmpResult<Vec<String>> {
        use crate::error::OmpError;
        use log::debug;

        let http = |e: reqwest::Error| OmpError::Http(e.to_string());
        let requests = self.requests()?;

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(http)?;

        client
            .post(LOGIN_URL)
            .form(&[
                ("identity", credentials.user.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(http)?;

        let mut lines = Vec::new();
        for (i, url) in requests.iter().enumerate() {
            if i > 0 {
                debug!(
                    "Sleeping for {} seconds between space-track requests",
                    self.request_delay.as_secs()
                );
                tokio::time::sleep(self.request_delay).await;
            }

            let body = client
                .get(url)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(http)?
                .text()
                .await
                .map_err(http)?;
            lines.extend(body.lines().map(str::to_string));
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_id_rejects_six_digits() {
        let mut st = SpaceTrack::new();
        assert!(matches!(
            st.add_id("255678"),
            Err(TleError::InvalidCatalogueId(_))
        ));
        assert!(st.add_id("abc").is_err());
        assert!(st.ids().is_empty());
    }

    #[test]
    fn test_add_id_accepts_numbers_and_strings() {
        let mut st = SpaceTrack::new();
        for id in [1u32, 9999, 10000, 99999] {
            st.add_id(id).unwrap();
            assert_eq!(st.ids().last().unwrap().parse::<u32>().unwrap(), id);
        }
        st.add_id("00042").unwrap();
        assert_eq!(st.ids().len(), 5);
    }

    #[test]
    fn test_build_request_sorts_and_dedups() {
        let mut st = SpaceTrack::new();
        for id in [345, 20, 45034, 2401, 4242, 20] {
            st.add_id(id).unwrap();
        }
        st.add_id("00345").unwrap();

        assert_eq!(
            SpaceTrack::build_request(st.ids()).unwrap(),
            "https://www.space-track.org/basicspacedata/query/class/tle_latest/ORDINAL/1/NORAD_CAT_ID/20,345,2401,4242,45034/orderby/EPOCH desc/format/tle"
        );
    }

    #[test]
    fn test_requests_are_batched() {
        let mut st = SpaceTrack::new();
        for id in 1..=45 {
            st.add_id(id).unwrap();
        }
        let requests = st.requests().unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests[2].contains("/NORAD_CAT_ID/41,42,43,44,45/"));
    }

    #[test]
    fn test_pair_lines() {
        let lines = vec![
            "1 25544U 98067A   14206.52997318 -.00005757  00000-0 -91404-4 0  7690\r",
            "",
            "2 25544 051.6472 269.5323 0006361 286.1580 210.2768 15.50427728897273",
            "1 39504U ...",
        ];
        let pairs = SpaceTrack::pair_lines(&lines);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].0.ends_with("7690"));
        assert!(pairs[0].1.starts_with("2 25544"));
    }
}
