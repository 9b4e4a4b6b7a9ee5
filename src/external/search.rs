//! # Search Backend Admin
//!
//! Installs the default index template on the Elasticsearch-compatible
//! backend: `PUT _index_template/<search-name>_search_mapping`. Strings map
//! to keywords via a dynamic template; the event envelope fields have fixed
//! types.

use serde_json::json;

use super::ExternalError;
use crate::crd::shared::ElasticSearchConfig;

/// The default index template installed for every search component.
pub fn default_index_template(index: &str) -> serde_json::Value {
    json!({
        "index_patterns": [format!("{index}*")],
        "template": {
            "mappings": {
                "dynamic_templates": [
                    {
                        "strings": {
                            "match_mapping_type": "string",
                            "mapping": { "type": "keyword" }
                        }
                    }
                ],
                "properties": {
                    "kind":    { "type": "keyword" },
                    "ledger":  { "type": "keyword" },
                    "when":    { "type": "date" },
                    "data":    { "type": "object", "enabled": false },
                    "indexed": { "type": "object" }
                }
            }
        }
    })
}

/// Stateless client for the search backend's admin API.
#[derive(Debug, Clone)]
pub struct SearchBackend {
    endpoint: String,
    basic_auth: Option<(String, String)>,
    http: reqwest::Client,
}

impl SearchBackend {
    pub fn new(config: &ElasticSearchConfig) -> Self {
        Self {
            endpoint: config.endpoint(),
            basic_auth: config
                .basic_auth
                .as_ref()
                .map(|auth| (auth.username.clone(), auth.password.clone())),
            http: reqwest::Client::new(),
        }
    }

    /// Install (or overwrite) the index template for the given search name.
    pub async fn put_index_template(&self, index: &str) -> Result<(), ExternalError> {
        let url = format!("{}/_index_template/{index}_search_mapping", self.endpoint);
        let mut request = self.http.put(url).json(&default_index_template(index));
        if let Some((username, password)) = &self.basic_auth {
            request = request.basic_auth(username, Some(password));
        }
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ExternalError::from_response(response).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_carries_fixed_property_types() {
        let template = default_index_template("acme");
        assert_eq!(template["index_patterns"][0], "acme*");
        let properties = &template["template"]["mappings"]["properties"];
        assert_eq!(properties["kind"]["type"], "keyword");
        assert_eq!(properties["ledger"]["type"], "keyword");
        assert_eq!(properties["when"]["type"], "date");
        let dynamic = &template["template"]["mappings"]["dynamic_templates"][0]["strings"];
        assert_eq!(dynamic["mapping"]["type"], "keyword");
    }
}
