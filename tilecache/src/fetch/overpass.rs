//! Overpass API geodata source.
//!
//! Issues one bounding-box query per feature kind against an Overpass
//! interpreter endpoint. The query document is the Overpass XML form with
//! JSON output requested, so responses parse with serde:
//!
//! ```text
//! <osm-script output="json">
//!     <query type="node">
//!         <bbox-query s="40.492" n="40.518" w="-7.408" e="-7.382"/>
//!     </query>
//!     <print/>
//! </osm-script>
//! ```
//!
//! Coordinates are converted to fixed-point at parse time; downstream code
//! never sees decimal degrees for individual features.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use crate::codec::{Node, Way};
use crate::coord::{lat_to_fixed, lon_to_fixed, BoundingBox};

use super::{AsyncHttpClient, FetchError, GeodataSource};

/// Public Overpass interpreter endpoint.
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Feature kinds the upstream service distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeatureKind {
    Node,
    Way,
}

impl FeatureKind {
    fn as_str(self) -> &'static str {
        match self {
            FeatureKind::Node => "node",
            FeatureKind::Way => "way",
        }
    }
}

/// Geodata source backed by an Overpass interpreter.
pub struct OverpassSource {
    http: Arc<dyn AsyncHttpClient>,
    url: String,
}

impl OverpassSource {
    /// Create a source against the default public endpoint.
    pub fn new(http: Arc<dyn AsyncHttpClient>) -> Self {
        Self {
            http,
            url: DEFAULT_OVERPASS_URL.to_owned(),
        }
    }

    /// Override the interpreter endpoint URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn query_document(kind: FeatureKind, bbox: &BoundingBox) -> String {
        // tile corners have two decimals and the margin three, so three
        // decimals renders every edge exactly
        format!(
            concat!(
                "<osm-script output=\"json\">\n",
                "    <query type=\"{kind}\">\n",
                "        <bbox-query s=\"{s:.3}\" n=\"{n:.3}\" w=\"{w:.3}\" e=\"{e:.3}\"/>\n",
                "    </query>\n",
                "    <print/>\n",
                "</osm-script>\n"
            ),
            kind = kind.as_str(),
            s = bbox.south,
            n = bbox.north,
            w = bbox.west,
            e = bbox.east,
        )
    }

    async fn query(&self, kind: FeatureKind, bbox: &BoundingBox) -> Result<Vec<RawElement>, FetchError> {
        let body = Self::query_document(kind, bbox);
        debug!(kind = kind.as_str(), url = %self.url, "Querying geodata service");
        let raw = self.http.post(&self.url, body).await?;
        let response: OverpassResponse = serde_json::from_slice(&raw)
            .map_err(|e| FetchError::Malformed(format!("invalid JSON from geodata service: {e}")))?;
        Ok(response.elements)
    }
}

impl GeodataSource for OverpassSource {
    fn query_nodes(
        &self,
        bbox: &BoundingBox,
    ) -> BoxFuture<'_, Result<BTreeMap<u64, Node>, FetchError>> {
        let bbox = *bbox;
        Box::pin(async move {
            let elements = self.query(FeatureKind::Node, &bbox).await?;
            let mut nodes = BTreeMap::new();
            for element in elements {
                if element.kind != "node" {
                    continue;
                }
                let lat = element
                    .lat
                    .ok_or_else(|| FetchError::Malformed(format!("node {} has no latitude", element.id)))?;
                let lon = element
                    .lon
                    .ok_or_else(|| FetchError::Malformed(format!("node {} has no longitude", element.id)))?;
                nodes.insert(
                    element.id,
                    Node {
                        lat: lat_to_fixed(lat),
                        lon: lon_to_fixed(lon),
                        tags: element.tags,
                    },
                );
            }
            Ok(nodes)
        })
    }

    fn query_ways(
        &self,
        bbox: &BoundingBox,
    ) -> BoxFuture<'_, Result<BTreeMap<u64, Way>, FetchError>> {
        let bbox = *bbox;
        Box::pin(async move {
            let elements = self.query(FeatureKind::Way, &bbox).await?;
            let mut ways = BTreeMap::new();
            for element in elements {
                if element.kind != "way" {
                    continue;
                }
                ways.insert(
                    element.id,
                    Way {
                        node_refs: element.nodes,
                        tags: element.tags,
                    },
                );
            }
            Ok(ways)
        })
    }
}

/// Top-level Overpass JSON response.
#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<RawElement>,
}

/// One feature as the upstream service describes it.
#[derive(Debug, Deserialize)]
struct RawElement {
    #[serde(rename = "type")]
    kind: String,
    id: u64,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default)]
    nodes: Vec<u64>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}
