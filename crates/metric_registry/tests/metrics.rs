use chrono::NaiveDate;
use indexmap::IndexMap;
use metric_registry::{
    InMemoryDataSource,
    MetricOptions,
    MetricRegistry,
    UserActivityWindow,
};
use request::Request;

fn window(start: &str, end: &str) -> (chrono::NaiveDateTime, chrono::NaiveDateTime) {
    let parse = |s: &str| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    };
    (parse(start), parse(end))
}

#[tokio::test]
async fn edit_count_reads_through_to_data_source() {
    let (start, end) = window("2013-01-01", "2013-01-08");
    let data_source = InMemoryDataSource {
        activity: IndexMap::from([(13234584, UserActivityWindow { edit_count: 18, ..Default::default() })]),
        ..Default::default()
    };

    let mut params = IndexMap::new();
    params.insert("cohort_expression".to_string(), "1".to_string());
    params.insert(
        "cohort_refresh_timestamp".to_string(),
        "2013-01-01T00:00:00Z".to_string(),
    );
    params.insert("metric".to_string(), "edit_count".to_string());
    params.insert("start".to_string(), "2013-01-01 00:00:00".to_string());
    params.insert("end".to_string(), "2013-01-08 00:00:00".to_string());
    let request = Request::from_http(&params).unwrap();
    let options = MetricOptions::from_request(&request);
    assert_eq!(options.start, start);
    assert_eq!(options.end, end);

    let registry = MetricRegistry::builtin();
    let metric = registry.get("edit_count").unwrap();
    let output = metric.process(&[13234584], &options, &data_source).await.unwrap();
    assert_eq!(output.rows.len(), 1);
    assert_eq!(output.rows[0].values[0], serde_json::json!(18));
}

#[tokio::test]
async fn live_account_distinguishes_fast_from_slow_and_absent_editors() {
    let (start, end) = window("2013-01-01", "2013-02-01");
    let registration = NaiveDate::from_ymd_opt(2013, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let data_source = InMemoryDataSource {
        activity: IndexMap::from([
            (1, UserActivityWindow {
                registration_time: Some(registration),
                edit_timestamps: vec![registration + chrono::Duration::minutes(10)],
                ..Default::default()
            }),
            (2, UserActivityWindow {
                registration_time: Some(registration),
                edit_timestamps: vec![registration + chrono::Duration::days(5)],
                ..Default::default()
            }),
            (3, UserActivityWindow { registration_time: Some(registration), ..Default::default() }),
        ]),
        ..Default::default()
    };

    let mut params = IndexMap::new();
    params.insert("cohort_expression".to_string(), "1".to_string());
    params.insert(
        "cohort_refresh_timestamp".to_string(),
        "2013-01-01T00:00:00Z".to_string(),
    );
    params.insert("metric".to_string(), "live_account".to_string());
    params.insert("start".to_string(), "2013-01-01 00:00:00".to_string());
    params.insert("end".to_string(), "2013-02-01 00:00:00".to_string());
    let request = Request::from_http(&params).unwrap();
    let options = MetricOptions::from_request(&request);
    assert_eq!(options.start, start);
    assert_eq!(options.end, end);

    let registry = MetricRegistry::builtin();
    let metric = registry.get("live_account").unwrap();
    let output = metric.process(&[1, 2, 3], &options, &data_source).await.unwrap();
    assert_eq!(output.rows[0].values[0], serde_json::json!(1));
    assert_eq!(output.rows[1].values[0], serde_json::json!(0));
    assert_eq!(output.rows[2].values[0], serde_json::json!(-1));
}
