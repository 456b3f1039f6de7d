//! Validation for multiple-choice parameters and resource IDs

use crate::error::{InatError, Result};
use crate::params::{ParamValue, RequestParams};

/// Taxonomic ranks that can be filtered on, lowest first
pub const RANKS: &[&str] = &[
    "form",
    "variety",
    "subspecies",
    "hybrid",
    "species",
    "genushybrid",
    "subgenus",
    "genus",
    "subtribe",
    "tribe",
    "supertribe",
    "subfamily",
    "family",
    "epifamily",
    "superfamily",
    "infraorder",
    "suborder",
    "order",
    "superorder",
    "infraclass",
    "subclass",
    "class",
    "superclass",
    "subphylum",
    "phylum",
    "kingdom",
];

pub const ICONIC_TAXA: &[&str] = &[
    "Unknown",
    "Animalia",
    "Aves",
    "Amphibia",
    "Reptilia",
    "Mammalia",
    "Actinopterygii",
    "Mollusca",
    "Arachnida",
    "Insecta",
    "Plantae",
    "Fungi",
    "Chromista",
    "Protozoa",
];

const CC_LICENSES: &[&str] = &[
    "CC-BY",
    "CC-BY-NC",
    "CC-BY-ND",
    "CC-BY-SA",
    "CC-BY-NC-ND",
    "CC-BY-NC-SA",
    "CC0",
];
const CONSERVATION_STATUSES: &[&str] = &["LC", "NT", "VU", "EN", "CR", "EW", "EX"];
const COMMUNITY_ID_STATUSES: &[&str] = &["most_agree", "most_disagree", "some_agree"];
const EXTRA_PROPERTIES: &[&str] = &["fields", "identifications", "projects"];
const GEOPRIVACY_LEVELS: &[&str] = &["obscured", "obscured_private", "open", "private"];
const HAS_PROPERTIES: &[&str] = &["photo", "geo"];
const HISTOGRAM_DATE_FIELDS: &[&str] = &["created", "observed"];
const HISTOGRAM_INTERVALS: &[&str] = &[
    "year",
    "month",
    "week",
    "day",
    "hour",
    "month_of_year",
    "week_of_year",
];
const ID_CATEGORIES: &[&str] = &["improving", "supporting", "leading", "maverick"];
const ORDER_DIRECTIONS: &[&str] = &["asc", "desc"];
const PROJECT_TYPES: &[&str] = &["collection", "umbrella"];
const QUALITY_GRADES: &[&str] = &["casual", "needs_id", "research"];
const SEARCH_PROPERTIES: &[&str] = &["names", "tags", "description", "place"];

/// Parameters with a fixed set of accepted values, shared by every endpoint
const MULTIPLE_CHOICE_PARAMS: &[(&str, &[&str])] = &[
    ("category", ID_CATEGORIES),
    ("csi", CONSERVATION_STATUSES),
    ("date_field", HISTOGRAM_DATE_FIELDS),
    ("extra", EXTRA_PROPERTIES),
    ("geoprivacy", GEOPRIVACY_LEVELS),
    ("has", HAS_PROPERTIES),
    ("hrank", RANKS),
    ("iconic_taxa", ICONIC_TAXA),
    ("identifications", COMMUNITY_ID_STATUSES),
    ("interval", HISTOGRAM_INTERVALS),
    ("license", CC_LICENSES),
    ("lrank", RANKS),
    ("max_rank", RANKS),
    ("min_rank", RANKS),
    ("observation_hrank", RANKS),
    ("observation_lrank", RANKS),
    ("observation_rank", RANKS),
    ("order", ORDER_DIRECTIONS),
    ("photo_license", CC_LICENSES),
    ("quality_grade", QUALITY_GRADES),
    ("rank", RANKS),
    ("search_on", SEARCH_PROPERTIES),
    ("sound_license", CC_LICENSES),
    ("taxon_geoprivacy", GEOPRIVACY_LEVELS),
    ("type", PROJECT_TYPES),
];

/// Treat "month of year" as "month_of_year"
fn normalize_choice(value: &mut ParamValue) {
    match value {
        ParamValue::Str(s) => *s = s.replace(' ', "_"),
        ParamValue::List(items) => items.iter_mut().for_each(normalize_choice),
        _ => {}
    }
}

fn is_valid_choice(value: &ParamValue, choices: &[&str]) -> bool {
    match value {
        ParamValue::Str(s) => s.is_empty() || choices.contains(&s.as_str()),
        ParamValue::List(items) => items.iter().all(|item| is_valid_choice(item, choices)),
        _ => false,
    }
}

fn choice_error(key: &str, choices: &[&str], value: &ParamValue) -> String {
    format!(
        "Parameter \"{}\" must have one of the following values: {:?}; value provided: {:?}",
        key, choices, value
    )
}

/// Check one endpoint-specific multiple-choice parameter
pub fn validate_multiple_choice_param(
    params: &mut RequestParams,
    key: &str,
    choices: &[&str],
) -> Result<()> {
    if let Some(value) = params.get_mut(key) {
        normalize_choice(value);
        if !is_valid_choice(value, choices) {
            return Err(InatError::Validation(choice_error(key, choices, value)));
        }
    }
    Ok(())
}

/// Check every shared multiple-choice parameter, reporting all problems at once
pub fn validate_multiple_choice_params(params: &mut RequestParams) -> Result<()> {
    let errors: Vec<String> = MULTIPLE_CHOICE_PARAMS
        .iter()
        .filter_map(|(key, choices)| validate_multiple_choice_param(params, key, choices).err())
        .map(|err| match err {
            InatError::Validation(msg) => msg,
            other => other.to_string(),
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(InatError::Validation(errors.join("\n")))
    }
}

/// Ensure ID(s) are all integers, and join them with commas
pub fn validate_ids(value: &ParamValue) -> Result<String> {
    let ids: Vec<i64> = match value {
        ParamValue::List(items) => items
            .iter()
            .map(|item| item.as_i64())
            .collect::<Option<Vec<_>>>(),
        ParamValue::Str(s) if s.contains(',') => s
            .split(',')
            .map(|part| part.trim().parse().ok())
            .collect::<Option<Vec<_>>>(),
        other => other.as_i64().map(|id| vec![id]),
    }
    .filter(|ids| !ids.is_empty())
    .ok_or_else(|| {
        InatError::Validation(format!("Invalid ID(s): {:?}; must specify integers only", value))
    })?;

    Ok(ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(","))
}
