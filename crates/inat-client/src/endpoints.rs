//! Descriptors for individual API endpoints
//!
//! Each function only describes a call; pass the result to
//! [`InatClient::execute`](crate::InatClient::execute) to run it.

use serde_json::{Map, Value};

use crate::error::{InatError, Result};
use crate::paginate::{AllStrategy, PaginationMode};
use crate::params::{ParamValue, RequestParams};
use crate::request::{Dialect, Method, RequestDescriptor};
use crate::validation::{validate_multiple_choice_param, RANKS};

/// Accepted `order_by` values for node observation search
pub const NODE_OBS_ORDER_BY_PROPERTIES: &[&str] =
    &["created_at", "id", "observed_on", "species_guess", "votes"];

/// Search observations. `page=all` walks results by ascending ID.
pub fn get_observations(mut params: RequestParams) -> Result<RequestDescriptor> {
    validate_multiple_choice_param(&mut params, "order_by", NODE_OBS_ORDER_BY_PROPERTIES)?;
    Ok(RequestDescriptor::get(Dialect::Node, "observations")
        .with_params(params)
        .with_pagination(PaginationMode::OffsetPage)
        .with_all_strategy(AllStrategy::IdAbove)
        .with_deprecated_param("project_id", "project_ids"))
}

/// A single observation by ID
pub fn get_observation(observation_id: i64) -> RequestDescriptor {
    RequestDescriptor::get(Dialect::Node, "observations/{id}").with_param("id", observation_id)
}

/// Replace `min_rank` / `max_rank` with the list of ranks between them
fn translate_rank_range(params: &mut RequestParams) -> Result<()> {
    let mut rank_index = |key: &str| -> Result<Option<usize>> {
        match params.remove(key) {
            None => Ok(None),
            Some(ParamValue::Str(rank)) if rank.is_empty() => Ok(None),
            Some(value) => value
                .as_str()
                .and_then(|rank| RANKS.iter().position(|r| *r == rank))
                .map(Some)
                .ok_or_else(|| InatError::Validation(format!("Invalid {}: {:?}", key, value))),
        }
    };

    let min = rank_index("min_rank")?;
    let max = rank_index("max_rank")?;
    if min.is_none() && max.is_none() {
        return Ok(());
    }

    let start = min.unwrap_or(0);
    let end = max.map_or(RANKS.len(), |i| i + 1);
    let ranks: Vec<&str> = RANKS.get(start..end).unwrap_or_default().to_vec();
    params.set("rank", ranks);
    Ok(())
}

/// Search taxa. `min_rank` / `max_rank` are expanded into a `rank` list.
pub fn get_taxa(mut params: RequestParams) -> Result<RequestDescriptor> {
    translate_rank_range(&mut params)?;
    Ok(RequestDescriptor::get(Dialect::Node, "taxa")
        .with_params(params)
        .with_pagination(PaginationMode::OffsetPage))
}

/// One or more taxa by ID
pub fn get_taxa_by_id(taxon_ids: impl Into<ParamValue>) -> RequestDescriptor {
    RequestDescriptor::get(Dialect::Node, "taxa/{id}").with_param("id", taxon_ids)
}

/// Standard and community places within a bounding box
pub fn get_places_nearby(
    nelat: f64,
    nelng: f64,
    swlat: f64,
    swlng: f64,
    params: RequestParams,
) -> Result<RequestDescriptor> {
    if !(-90.0..=90.0).contains(&nelat) || !(-90.0..=90.0).contains(&swlat) {
        return Err(InatError::Validation(format!(
            "Latitude out of range: {}, {}",
            nelat, swlat
        )));
    }
    if !(-180.0..=180.0).contains(&nelng) || !(-180.0..=180.0).contains(&swlng) {
        return Err(InatError::Validation(format!(
            "Longitude out of range: {}, {}",
            nelng, swlng
        )));
    }

    Ok(RequestDescriptor::get(Dialect::Node, "places/nearby").with_params(
        params
            .with("nelat", nelat)
            .with("nelng", nelng)
            .with("swlat", swlat)
            .with("swlng", swlng),
    ))
}

/// Places matching a name prefix. `page=all` adds a second request ordered by
/// area to reach past the first 20 matches.
pub fn get_places_autocomplete(q: &str, params: RequestParams) -> RequestDescriptor {
    RequestDescriptor::get(Dialect::Node, "places/autocomplete")
        .with_params(params.with("q", q))
        .with_pagination(PaginationMode::OffsetPage)
        .with_all_strategy(AllStrategy::Autocomplete)
}

/// Search observation fields (REST)
pub fn get_observation_fields(params: RequestParams) -> RequestDescriptor {
    RequestDescriptor::get(Dialect::Rest, "observation_fields.json")
        .with_params(params)
        .with_pagination(PaginationMode::OffsetPage)
}

/// Create an observation (REST, authenticated).
///
/// Accepts either flat fields or iNaturalist's own `{"observation": {...}}`
/// nesting. `ignore_photos` defaults to on.
pub fn create_observation(fields: Value) -> Result<RequestDescriptor> {
    let Value::Object(mut fields) = fields else {
        return Err(InatError::Validation(
            "Observation fields must be a JSON object".to_string(),
        ));
    };

    if let Some(Value::Object(nested)) = fields.remove("observation") {
        fields.extend(nested);
    }

    let ignore_photos = match fields.get("ignore_photos") {
        Some(Value::Bool(flag)) => i64::from(*flag),
        Some(Value::Number(n)) => i64::from(n.as_i64().unwrap_or(1) != 0),
        _ => 1,
    };
    fields.insert("ignore_photos".to_string(), Value::from(ignore_photos));

    let mut body = Map::new();
    body.insert("observation".to_string(), Value::Object(fields));

    Ok(
        RequestDescriptor::new(Method::Post, Dialect::Rest, "observations.json")
            .requires_auth()
            .with_json_body(Value::Object(body)),
    )
}

/// Delete an observation (REST, authenticated)
pub fn delete_observation(observation_id: i64) -> RequestDescriptor {
    RequestDescriptor::new(Method::Delete, Dialect::Rest, "observations/{id}.json")
        .with_param("id", observation_id)
        .requires_auth()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{AuthContext, RequestBuilder};
    use serde_json::json;

    fn build(descriptor: &RequestDescriptor) -> crate::request::WireRequest {
        RequestBuilder::default()
            .build(descriptor, &AuthContext::new("token"))
            .unwrap()
            .wire
    }

    #[test]
    fn test_observations_order_by_validated() {
        let ok = get_observations(RequestParams::new().with("order_by", "votes"));
        assert!(ok.is_ok());

        let bad = get_observations(RequestParams::new().with("order_by", "date_added"));
        assert!(matches!(bad, Err(InatError::Validation(_))));
    }

    #[test]
    fn test_observations_all_uses_id_above() {
        let descriptor = get_observations(RequestParams::new().with("page", "all")).unwrap();
        assert_eq!(descriptor.all_strategy(), &AllStrategy::IdAbove);
    }

    #[test]
    fn test_observation_by_id() {
        let wire = build(&get_observation(16227955));
        assert_eq!(wire.url, "https://api.inaturalist.org/v1/observations/16227955");
    }

    #[test]
    fn test_taxa_rank_range() {
        let descriptor = get_taxa(
            RequestParams::new()
                .with("min_rank", "genus")
                .with("max_rank", "family"),
        )
        .unwrap();
        let wire = build(&descriptor);
        assert_eq!(
            wire.query_value("rank"),
            Some("genus,subtribe,tribe,supertribe,subfamily,family")
        );
        assert_eq!(wire.query_value("min_rank"), None);

        let invalid = get_taxa(RequestParams::new().with("min_rank", "clade"));
        assert!(invalid.is_err());
    }

    #[test]
    fn test_taxa_by_id() {
        let wire = build(&get_taxa_by_id(vec![343248, 52747]));
        assert_eq!(wire.url, "https://api.inaturalist.org/v1/taxa/343248,52747");
    }

    #[test]
    fn test_places_nearby() {
        let descriptor =
            get_places_nearby(-49.999, -149.999, -50.0, 150.0, RequestParams::new()).unwrap();
        let wire = build(&descriptor);
        assert_eq!(wire.query_value("nelat"), Some("-49.999"));
        assert_eq!(wire.query_value("swlng"), Some("150"));

        assert!(get_places_nearby(91.0, 0.0, 0.0, 0.0, RequestParams::new()).is_err());
    }

    #[test]
    fn test_places_autocomplete() {
        let descriptor = get_places_autocomplete("Irkutsk", RequestParams::new());
        assert_eq!(descriptor.all_strategy(), &AllStrategy::Autocomplete);
        let wire = build(&descriptor);
        assert_eq!(wire.url, "https://api.inaturalist.org/v1/places/autocomplete");
        assert_eq!(wire.query_value("q"), Some("Irkutsk"));
    }

    #[test]
    fn test_observation_fields_rest() {
        let wire = build(&get_observation_fields(
            RequestParams::new().with("q", "number of individuals"),
        ));
        assert_eq!(wire.url, "https://www.inaturalist.org/observation_fields.json");
    }

    #[test]
    fn test_create_observation_body() {
        let descriptor = create_observation(json!({
            "observation": { "species_guess": "Pieris rapae" }
        }))
        .unwrap();
        assert!(descriptor.is_auth_required());

        let wire = build(&descriptor);
        assert_eq!(wire.method, Method::Post);
        assert_eq!(
            wire.body,
            Some(json!({
                "observation": { "species_guess": "Pieris rapae", "ignore_photos": 1 }
            }))
        );

        let kept = create_observation(json!({ "ignore_photos": false })).unwrap();
        assert_eq!(
            build(&kept).body,
            Some(json!({ "observation": { "ignore_photos": 0 } }))
        );

        assert!(create_observation(json!([1, 2])).is_err());
    }

    #[test]
    fn test_delete_observation() {
        let descriptor = delete_observation(17932425);
        assert!(descriptor.is_auth_required());
        let wire = build(&descriptor);
        assert_eq!(wire.method, Method::Delete);
        assert_eq!(wire.url, "https://www.inaturalist.org/observations/17932425.json");

        let anonymous = RequestBuilder::default().build(&descriptor, &AuthContext::anonymous());
        assert!(anonymous.is_err());
    }
}
