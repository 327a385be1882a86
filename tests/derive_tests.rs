use serde::{Deserialize, Serialize};
use serde_json::json;
use weather_agent::agent::{validate_against_schema, AgentState, StructuredProvider};
use weather_agent::Structured;

/// A location on the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Structured)]
struct Coordinates {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Structured)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum Sky {
    Clear,
    PartlyCloudy,
    #[serde(rename = "storm")]
    Thunderstorm,
}

/// Forecast for several cities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Structured)]
#[serde(rename_all = "camelCase")]
struct Forecast {
    /// Cities covered by the forecast
    cities: Vec<String>,

    /// Ignored in favour of the schema attribute
    #[schema(description = "Tags describing the forecast")]
    tags: Vec<String>,

    high_temperature: i32,

    #[serde(rename = "summary_text")]
    summary: Option<String>,

    /// Where the forecast was taken
    station: Coordinates,

    sky: Sky,

    history: Option<Vec<Box<Coordinates>>>,

    #[serde(skip)]
    internal_note: String,
}

#[test]
fn test_vec_fields_become_arrays() {
    let schema = Forecast::schema().schema;

    assert_eq!(
        schema["properties"]["cities"],
        json!({
            "type": "array",
            "items": {"type": "string"},
            "description": "Cities covered by the forecast"
        })
    );
}

#[test]
fn test_schema_attribute_wins_over_doc_comment() {
    let schema = Forecast::schema();

    assert_eq!(schema.name, "Forecast");
    assert_eq!(schema.description.as_deref(), Some("Forecast for several cities"));
    assert_eq!(
        schema.schema["properties"]["tags"],
        json!({
            "type": "array",
            "items": {"type": "string"},
            "description": "Tags describing the forecast"
        })
    );
}

#[test]
fn test_serde_renames_and_skips_are_honoured() {
    let schema = Forecast::schema().schema;
    let properties = schema["properties"].as_object().unwrap();

    assert!(properties.contains_key("highTemperature"));
    assert!(properties.contains_key("summary_text"));
    assert!(!properties.contains_key("high_temperature"));
    assert!(!properties.contains_key("summary"));
    assert!(!properties.contains_key("internalNote"));
    assert!(!properties.contains_key("internal_note"));
    assert_eq!(
        schema["required"],
        json!(["cities", "tags", "highTemperature", "station", "sky"])
    );
}

#[test]
fn test_nested_types_embed_their_schema() {
    let schema = Forecast::schema().schema;

    assert_eq!(
        schema["properties"]["station"],
        json!({
            "type": "object",
            "properties": {
                "latitude": {"type": "number"},
                "longitude": {"type": "number"}
            },
            "required": ["latitude", "longitude"],
            "description": "Where the forecast was taken"
        })
    );
    assert_eq!(
        schema["properties"]["sky"],
        json!({"type": "string", "enum": ["CLEAR", "PARTLY_CLOUDY", "storm"]})
    );
    assert_eq!(
        schema["properties"]["history"]["items"]["required"],
        json!(["latitude", "longitude"])
    );
}

#[test]
fn test_schema_matches_what_deserialization_accepts() {
    let value = json!({
        "cities": ["Tokyo", "Florida"],
        "tags": ["sunny"],
        "highTemperature": 31,
        "summary_text": "Hot and bright",
        "station": {"latitude": 35.6, "longitude": 139.7},
        "sky": "PARTLY_CLOUDY",
        "history": null
    });
    let schema = Forecast::schema().schema;
    validate_against_schema(&value, &schema).unwrap();

    let state = AgentState {
        messages: Vec::new(),
        structured_response: Some(value),
    };
    let forecast: Forecast = state.structured().unwrap();
    assert_eq!(forecast.high_temperature, 31);
    assert_eq!(forecast.summary.as_deref(), Some("Hot and bright"));
    assert_eq!(forecast.sky, Sky::PartlyCloudy);
    assert_eq!(forecast.station.longitude, 139.7);
    assert!(forecast.internal_note.is_empty());
}

#[test]
fn test_nested_fields_are_validated() {
    let schema = Forecast::schema().schema;
    let value = json!({
        "cities": [],
        "tags": [],
        "highTemperature": 20,
        "station": {"latitude": 1.0},
        "sky": "CLEAR"
    });

    let err = validate_against_schema(&value, &schema).unwrap_err();
    assert_eq!(err, "$.station is missing required field 'longitude'");

    let mut fixed = value.clone();
    fixed["station"]["longitude"] = json!(2.0);
    fixed["sky"] = json!("Clear");
    let err = validate_against_schema(&fixed, &schema).unwrap_err();
    assert!(err.starts_with("$.sky must be one of"));
}
