use gristmill::item::{classify, domain_from_url, month_key};

#[test]
fn story_sub_kinds_come_from_title_prefixes() {
    let ask = classify("story", Some("Ask HN: how do I parse this?"));
    assert!(ask.story && ask.ask && !ask.show && !ask.launch);

    let show = classify("story", Some("Show HN: a tiny thing"));
    assert!(show.story && show.show);

    let launch = classify("story", Some("Launch HN: Widgets (YC W20)"));
    assert!(launch.story && launch.launch);
}

#[test]
fn title_prefixes_match_case_insensitively() {
    assert!(classify("story", Some("ask hn: lowercase")).ask);
    assert!(classify("story", Some("SHOW HN: SHOUTING")).show);
    // Prefix only; a mention elsewhere in the title does not count.
    assert!(!classify("story", Some("I saw an Ask HN: yesterday")).ask);
}

#[test]
fn sub_kinds_apply_to_stories_only() {
    let c = classify("comment", Some("Ask HN: in a comment title"));
    assert!(c.comment && !c.ask && !c.story);
    let j = classify("job", Some("Show HN: hiring"));
    assert!(j.job && !j.show);
}

#[test]
fn plain_kinds_classify_by_type_column() {
    assert!(classify("comment", None).comment);
    assert!(classify("story", None).story);
    assert!(classify("job", None).job);
    assert!(classify("poll", None).poll);
    let unknown = classify("pollopt", None);
    assert_eq!(unknown, Default::default());
}

#[test]
fn domains_strip_www_and_lowercase() {
    assert_eq!(
        domain_from_url("http://www.example.com/story?id=1"),
        Some("example.com".to_string())
    );
    assert_eq!(
        domain_from_url("https://Example.COM/path"),
        Some("example.com".to_string())
    );
    assert_eq!(
        domain_from_url("https://blog.example.com"),
        Some("blog.example.com".to_string())
    );
}

#[test]
fn domains_keep_ports_and_drop_userinfo() {
    assert_eq!(
        domain_from_url("http://example.com:8080/x"),
        Some("example.com:8080".to_string())
    );
    assert_eq!(
        domain_from_url("http://user:pw@example.com/x"),
        Some("example.com".to_string())
    );
}

#[test]
fn unparsable_urls_have_no_domain() {
    assert_eq!(domain_from_url("notaurl"), None);
    assert_eq!(domain_from_url("example.com/no-scheme"), None);
    assert_eq!(domain_from_url("http://"), None);
    assert_eq!(domain_from_url("1 2://weird"), None);
}

#[test]
fn month_keys_are_utc_year_month() {
    assert_eq!(month_key(1700000000), Some("2023-11".to_string()));
    assert_eq!(month_key(100), Some("1970-01".to_string()));
    assert_eq!(month_key(0), None);
}
