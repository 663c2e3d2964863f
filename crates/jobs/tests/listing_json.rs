use chrono::{TimeZone, Utc};
use forfore_jobs::{JobFilter, build_dataset, filter_listings};
use serde_json::{Value, json};

#[test]
fn listing_serializes_with_day_precision_posted_date() {
    let now = Utc
        .with_ymd_and_hms(2025, 11, 2, 9, 30, 0)
        .single()
        .expect("valid instant");
    let listings = build_dataset(now);
    let rows = filter_listings(&listings, &JobFilter::default().with_query("barista"));
    let payload = serde_json::to_value(&rows).expect("serialize");

    assert_eq!(payload.as_array().map(Vec::len), Some(1));
    let row = &payload[0];
    assert_eq!(row["id"], json!(1));
    assert_eq!(row["posted"], json!("2025-10-31"));
    assert_eq!(row["employment_type"], json!("Part-time"));
    assert_eq!(row["visa"], json!(["F-2", "F-4", "F-5", "F-6"]));
    assert!(row.get("posted_at").is_none());
}

#[test]
fn filter_deserializes_from_partial_json() {
    let filter: JobFilter =
        serde_json::from_value(json!({ "category": "Education", "visas": ["F-6"] }))
            .expect("deserialize");
    let listings = build_dataset(Utc::now());

    let titles = filter_listings(&listings, &filter)
        .into_iter()
        .map(|listing| Value::from(listing.title.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(titles, vec![json!("English Instructor"), json!("Math Tutor")]);
}
