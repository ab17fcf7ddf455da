use super::common::{find, find_n, names, obj, seeded, seqs};
use nexus_search::ConnectorError;
use nexus_search::devlog::{drain, enable_thread_sink};
use serde_json::{Value, json};

#[tokio::test]
async fn find_all_and_limit() {
    let (c, _) = seeded().await;
    assert_eq!(find(&c, json!({})).await.len(), 6);
    assert_eq!(find(&c, json!({"limit": 3})).await.len(), 3);
}

#[tokio::test]
async fn skip_and_offset_apply_after_ordering() {
    let (c, _) = seeded().await;
    let r = find(&c, json!({"skip": 1, "limit": 4, "order": "seq"})).await;
    assert_eq!(r.len(), 4);
    assert_eq!(seqs(&r)[0], 1);
    let r = find(&c, json!({"offset": 2, "limit": 4, "order": "seq"})).await;
    assert_eq!(seqs(&r)[0], 2);
    let err = c.filter(&json!({"skip": 1, "offset": 2})).unwrap_err();
    assert!(matches!(err, ConnectorError::Validation(_)));
}

#[tokio::test]
async fn where_equality() {
    let (c, _) = seeded().await;
    let leads = find(&c, json!({"where": {"role": "lead"}})).await;
    assert_eq!(names(&leads), ["John Lennon", "Paul McCartney"]);
    let paul = find(&c, json!({"where": {"id": 1}})).await;
    assert_eq!(names(&paul), ["Paul McCartney"]);
}

#[tokio::test]
async fn order_by_name_and_multiple_keys() {
    let (c, _) = seeded().await;
    let r = find(&c, json!({"order": "name"})).await;
    let n = names(&r);
    assert_eq!(n.first().map(String::as_str), Some("George Harrison"));
    assert_eq!(n.last().map(String::as_str), Some("Stuart Sutcliffe"));

    let r = find(&c, json!({"order": "order"})).await;
    assert_eq!(seqs(&r), [1, 0, 5, 4, 2, 3]);
    let r = find(&c, json!({"order": "order DESC"})).await;
    assert_eq!(seqs(&r), [3, 2, 4, 5, 0, 1]);

    // vip ties broken by order; Pete lacks vip and sorts last
    let r = find(&c, json!({"order": ["vip DESC", "order ASC"]})).await;
    assert_eq!(seqs(&r), [1, 0, 5, 2, 3, 4]);
}

#[tokio::test]
async fn unsortable_text_field_is_rejected() {
    let (c, _) = seeded().await;
    let err = c.filter(&json!({"order": "email"})).unwrap_err();
    assert!(matches!(err, ConnectorError::Validation(_)));
}

#[tokio::test]
async fn and_or_combinators() {
    let (c, _) = seeded().await;
    let and_hit = json!({"where": {"and": [{"name": "John Lennon"}, {"role": "lead"}]}});
    assert_eq!(find(&c, and_hit).await.len(), 1);
    let and_miss = json!({"where": {"and": [{"name": "John Lennon"}, {"role": "member"}]}});
    assert!(find(&c, and_miss).await.is_empty());
    let or_hit = json!({"where": {"or": [{"name": "John Lennon"}, {"role": "lead"}]}});
    assert_eq!(find(&c, or_hit).await.len(), 2);
    let or_miss = json!({"where": {"or": [{"name": "XYZ"}, {"role": "Hello1"}]}});
    assert!(find(&c, or_miss).await.is_empty());
}

#[tokio::test]
async fn date_ranges() {
    let (c, _) = seeded().await;
    let r = find(&c, json!({"where": {"birthday": {"gte": "1980-12-08"}}})).await;
    assert_eq!(names(&r), ["John Lennon"]);
    assert!(find(&c, json!({"where": {"birthday": {"gt": "1980-12-08"}}})).await.is_empty());
    assert_eq!(find(&c, json!({"where": {"birthday": {"gt": "1980-12-07"}}})).await.len(), 1);
    let r = find(&c, json!({"where": {"birthday": {"lt": "1980-12-07"}}})).await;
    assert_eq!(names(&r), ["Paul McCartney"]);
    // same instant, different spelling
    let r = find(&c, json!({"where": {"birthday": {"lte": "1980-12-08T00:00:00Z"}}})).await;
    assert_eq!(r.len(), 2);
}

#[tokio::test]
async fn number_ranges() {
    let (c, _) = seeded().await;
    let r = find(&c, json!({"where": {"order": {"gte": 3}}})).await;
    assert_eq!(r.len(), 4);
    assert_eq!(names(&r)[0], "George Harrison");
    assert!(find(&c, json!({"where": {"order": {"gt": 6}}})).await.is_empty());
    let r = find(&c, json!({"where": {"order": {"gt": 5}}})).await;
    assert_eq!(names(&r), ["Ringo Starr"]);
    let r = find(&c, json!({"where": {"order": {"lt": 2}}})).await;
    assert_eq!(names(&r), ["Paul McCartney"]);
    assert!(find(&c, json!({"where": {"order": {"gt": null}}})).await.is_empty());
    let r = find(&c, json!({"where": {"order": {"between": [2, 3]}}})).await;
    assert_eq!(seqs(&r), [0, 5]);
}

#[tokio::test]
async fn string_ranges() {
    let (c, _) = seeded().await;
    let r = find(&c, json!({"where": {"name": {"gte": "Paul McCartney"}}})).await;
    assert_eq!(r.len(), 4);
    assert_eq!(names(&r)[0], "Paul McCartney");
    assert!(find(&c, json!({"where": {"name": {"gt": "xyz"}}})).await.is_empty());
    let r = find(&c, json!({"where": {"name": {"gt": "Paul McCartney"}}})).await;
    assert_eq!(r.len(), 3);
    assert_eq!(names(&r)[0], "Ringo Starr");
    let r = find(&c, json!({"where": {"name": {"lt": "Paul McCartney"}}})).await;
    assert_eq!(r.len(), 2);
    assert_eq!(names(&r)[0], "John Lennon");
}

#[tokio::test]
async fn boolean_ranges() {
    let (c, _) = seeded().await;
    let r = find(&c, json!({"where": {"vip": {"gte": true}}})).await;
    assert_eq!(r.len(), 3);
    assert_eq!(names(&r)[0], "John Lennon");
    assert!(find(&c, json!({"where": {"vip": {"gt": true}}})).await.is_empty());
    assert_eq!(find(&c, json!({"where": {"vip": {"gt": false}}})).await.len(), 3);
    let r = find(&c, json!({"where": {"vip": {"lt": true}}})).await;
    assert_eq!(r.len(), 2);
    assert_eq!(names(&r)[0], "George Harrison");
    assert!(find(&c, json!({"where": {"vip": {"lt": false}}})).await.is_empty());
}

#[tokio::test]
async fn operator_type_mismatch_fails_before_the_backend() {
    let (c, backend) = seeded().await;
    backend.set_available(false);
    let err = c.filter(&json!({"where": {"order": {"gt": "three"}}})).unwrap_err();
    assert!(matches!(err, ConnectorError::Validation(_)));
    let err = c.filter(&json!({"where": {"order": {"near": 3}}})).unwrap_err();
    assert!(matches!(err, ConnectorError::Validation(_)));
}

#[tokio::test]
async fn count_with_and_without_where() {
    let (c, _) = seeded().await;
    let all = c.filter(&json!({})).unwrap();
    assert_eq!(c.count(&all.condition).await.unwrap(), 6);
    let leads = c.filter(&json!({"where": {"role": "lead"}})).unwrap();
    assert_eq!(c.count(&leads.condition).await.unwrap(), 2);
}

#[tokio::test]
async fn find_one_first_and_last() {
    let (c, _) = seeded().await;
    let first = c.find_one(&c.filter(&json!({"order": "order"})).unwrap()).await.unwrap().unwrap();
    assert_eq!(first.get("name"), Some(&json!("Paul McCartney")));
    let last = c.find_one(&c.filter(&json!({"order": "order DESC"})).unwrap()).await.unwrap().unwrap();
    assert_eq!(last.get("name"), Some(&json!("Ringo Starr")));
    let lead = c
        .find_one(&c.filter(&json!({"where": {"role": "lead"}, "order": "order DESC"})).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lead.get("name"), Some(&json!("John Lennon")));
    let by_id = c.find_one(&c.filter(&json!({"where": {"id": 3}})).unwrap()).await.unwrap().unwrap();
    assert_eq!(by_id.id(), Some(&json!(3)));
    let none = c.find_one(&c.filter(&json!({"where": {"name": "Nobody"}})).unwrap()).await.unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn exists_and_find_by_id() {
    let (c, _) = seeded().await;
    assert!(c.exists(&json!(1)).await.unwrap());
    assert!(!c.exists(&json!(99)).await.unwrap());
    let paul = c.find_by_id(&json!(1)).await.unwrap().unwrap();
    assert_eq!(paul.get("name"), Some(&json!("Paul McCartney")));
    assert_eq!(paul.get("birthday"), Some(&json!("1942-06-18T00:00:00.000Z")));
    assert!(c.find_by_id(&json!(99)).await.unwrap().is_none());
}

#[tokio::test]
async fn destroy_all_with_where() {
    let (c, _) = seeded().await;
    let john = c.filter(&json!({"where": {"name": "John Lennon"}})).unwrap();
    assert_eq!(c.destroy_all(&john.condition).await.unwrap().deleted, 1);
    let leads = find_n(&c, json!({"where": {"role": "lead"}}), 1).await;
    assert_eq!(names(&leads), ["Paul McCartney"]);
    assert!(!c.exists(&json!(0)).await.unwrap());
    assert_eq!(c.destroy_by_id(&json!(1)).await.unwrap().deleted, 1);
    find_n(&c, json!({}), 4).await;
}

#[tokio::test]
async fn update_or_create_merges_existing() {
    let (c, _) = seeded().await;
    let r = c.update_or_create(obj(json!({"seq": 1, "rating": 5}))).await.unwrap();
    assert_eq!(r.get("name"), Some(&json!("Paul McCartney")));
    assert_eq!(r.get("rating"), Some(&json!(5)));
    let stored = c.find_by_id(&json!(1)).await.unwrap().unwrap();
    assert_eq!(stored.get("rating"), Some(&json!(5)));
    assert_eq!(stored.get("role"), Some(&json!("lead")));
    let rated = find_n(&c, json!({"where": {"rating": 5}}), 1).await;
    assert_eq!(seqs(&rated), [1]);
}

#[tokio::test]
async fn update_or_create_creates_missing() {
    let (c, _) = seeded().await;
    let r = c
        .update_or_create(obj(json!({"seq": 6, "name": "Pulkit Singhal", "order": 7, "vip": false})))
        .await
        .unwrap();
    assert_eq!(r.id(), Some(&json!(6)));
    let all = find_n(&c, json!({"order": "order DESC"}), 7).await;
    assert_eq!(names(&all)[0], "Pulkit Singhal");
}

#[tokio::test]
async fn update_attributes_adds_new_fields() {
    let (c, _) = seeded().await;
    let paul = c.find_by_id(&json!(1)).await.unwrap().unwrap();
    let r = c
        .update_attributes(paul.id().unwrap(), obj(json!({"newField": 1, "order": 999})))
        .await
        .unwrap();
    assert_eq!(r.get("newField"), Some(&json!(1)));
    assert_eq!(r.get("order"), Some(&json!(999)));
    assert_eq!(r.get("name"), Some(&json!("Paul McCartney")));

    let err = c.update_attributes(&json!(42), obj(json!({"order": 1}))).await.unwrap_err();
    assert!(matches!(err, ConnectorError::NoSuchDocument(_)));
    let err = c.update_attributes(&json!(1), obj(json!({"seq": 2}))).await.unwrap_err();
    assert!(matches!(err, ConnectorError::Validation(_)));
}

#[tokio::test]
async fn native_query_passthrough() {
    let (c, _) = seeded().await;
    let r = find(&c, json!({"native": {"query": {"match_all": {}}}})).await;
    assert_eq!(r.len(), 6);
    let r = find(&c, json!({"native": {"query": {"term": {"role": "lead"}}, "size": 1}})).await;
    assert_eq!(r.len(), 1);
}

#[tokio::test]
async fn suggests_without_matches_is_not_an_error() {
    let (c, _) = seeded().await;
    let r = find(&c, json!({"suggests": {"title_suggester": {"text": "d", "term": {"field": "name"}}}})).await;
    assert!(r.is_empty());
    let r = find(&c, json!({"suggests": {"s": {"text": "rin", "term": {"field": "name"}}}})).await;
    assert_eq!(r[0].get("text"), Some(&json!("ringo")));
    assert_eq!(r[0].get("suggester"), Some(&json!("s")));

    let typed = c.suggest(&json!({"s": {"prefix": "pa", "completion": {"field": "name"}}})).await.unwrap();
    assert_eq!(typed["s"][0].options[0].text, "Paul McCartney");
}

#[tokio::test]
async fn find_by_ids_has_no_order_guarantee() {
    let (c, _) = seeded().await;
    let r = c.find_by_ids(&[json!(3), json!(2), json!(1)], None).await.unwrap();
    let mut got = seqs(&r);
    got.sort_unstable();
    assert_eq!(got, [1, 2, 3]);
}

#[tokio::test]
async fn find_by_ids_with_condition() {
    let (c, _) = seeded().await;
    let vip = c.filter(&json!({"where": {"vip": true}})).unwrap();
    let ids: Vec<Value> = (0..4).map(|i| json!(i)).collect();
    let r = c.find_by_ids(&ids, Some(&vip)).await.unwrap();
    let mut got = seqs(&r);
    got.sort_unstable();
    assert_eq!(got, [0, 1]);
}

#[tokio::test]
async fn projection_keeps_listed_fields() {
    let (c, _) = seeded().await;
    let r = find(&c, json!({"where": {"id": 0}, "fields": {"name": true, "vip": true}})).await;
    assert_eq!(serde_json::to_value(&r[0]).unwrap(), json!({"name": "John Lennon", "vip": true}));
    let r = find(&c, json!({"where": {"id": 4}, "fields": {"email": false, "order": false}})).await;
    assert_eq!(serde_json::to_value(&r[0]).unwrap(), json!({"seq": 4, "name": "Pete Best"}));
}

#[tokio::test]
async fn backend_outage_is_distinct_from_no_results() {
    let (c, backend) = seeded().await;
    assert!(find(&c, json!({"where": {"name": "Nobody"}})).await.is_empty());
    backend.set_available(false);
    let f = c.filter(&json!({})).unwrap();
    assert!(c.find(&f).await.unwrap_err().is_connectivity());
    assert!(c.ping().await.unwrap_err().is_connectivity());
    backend.set_available(true);
    assert!(c.ping().await.is_ok());
}

#[tokio::test]
async fn translated_requests_are_traced() {
    let (c, _) = seeded().await;
    let _g = enable_thread_sink();
    find(&c, json!({"where": {"role": "lead"}})).await;
    let lines = drain();
    assert!(lines.iter().any(|l| l.starts_with("search user") && l.contains("\"term\"")));
}
