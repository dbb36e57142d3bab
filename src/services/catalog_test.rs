use super::*;

fn catalog() -> Catalog {
    Catalog::load().expect("embedded seed should parse")
}

const SMALL: &str = r"
titles:
  - { id: 1, kind: movie, title: Alpha, year: 2020, genres: [Drama], rating: 7.0, synopsis: a, poster: /a.jpg, views: 10 }
  - { id: 2, kind: movie, title: Beta, year: 2021, genres: [Drama, Comedy], rating: 6.0, synopsis: b, poster: /b.jpg, featured: true, views: 30 }
  - { id: 1, kind: series, title: Gamma, year: 2022, genres: [Comedy], rating: 8.0, seasons: 2, synopsis: c, poster: /c.jpg, views: 20 }
users:
  - { id: 1, email: root@x.test, name: Root, is_admin: true, profiles: 1, status: active, joined: 2024-01-01 }
  - { id: 2, email: sam@x.test, name: Sam Hill, profiles: 2, status: suspended, joined: 2024-02-01 }
";

#[test]
fn embedded_seed_loads() {
    let catalog = catalog();
    assert!(catalog.analytics().total_titles > 0);
    assert!(!catalog.featured().is_empty());
    assert!(catalog.get(TitleKind::Movie, 1).is_some());
    assert!(catalog.get(TitleKind::Series, 101).is_some());
}

#[test]
fn duplicate_ids_within_a_kind_are_rejected() {
    let yaml = r"
titles:
  - { id: 1, kind: movie, title: A, year: 2020, genres: [], rating: 1.0, synopsis: a, poster: /a }
  - { id: 1, kind: movie, title: B, year: 2020, genres: [], rating: 1.0, synopsis: b, poster: /b }
";
    assert!(matches!(
        Catalog::from_yaml(yaml),
        Err(CatalogError::DuplicateId { kind: TitleKind::Movie, id: 1 })
    ));
}

#[test]
fn same_id_across_kinds_is_allowed() {
    let catalog = Catalog::from_yaml(SMALL).unwrap();
    assert_eq!(catalog.get(TitleKind::Movie, 1).unwrap().title, "Alpha");
    assert_eq!(catalog.get(TitleKind::Series, 1).unwrap().title, "Gamma");
    assert!(catalog.get(TitleKind::Series, 2).is_none());
}

#[test]
fn malformed_seed_is_parse_error() {
    assert!(matches!(Catalog::from_yaml("titles: 3"), Err(CatalogError::Parse(_))));
}

#[test]
fn rows_group_by_genre_in_first_appearance_order() {
    let catalog = Catalog::from_yaml(SMALL).unwrap();
    let rows = catalog.rows();
    let genres: Vec<_> = rows.iter().map(|r| r.genre.as_str()).collect();
    assert_eq!(genres, vec!["Drama", "Comedy"]);
    let comedy: Vec<_> = rows[1].titles.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(comedy, vec!["Beta", "Gamma"]);
}

#[test]
fn search_is_case_insensitive_on_title_and_genre() {
    let catalog = Catalog::from_yaml(SMALL).unwrap();
    let hits: Vec<_> = catalog.search("ALP").into_iter().map(|t| t.title).collect();
    assert_eq!(hits, vec!["Alpha"]);
    assert_eq!(catalog.search("comedy").len(), 2);
    assert!(catalog.search("   ").is_empty());
    assert!(catalog.search("zzz").is_empty());
}

#[test]
fn admin_titles_filter_by_kind_and_query() {
    let catalog = Catalog::from_yaml(SMALL).unwrap();
    let page = catalog.admin_titles(&ContentFilter { kind: Some(TitleKind::Movie), ..ContentFilter::default() });
    assert_eq!(page.total, 2);

    let page = catalog.admin_titles(&ContentFilter {
        kind: Some(TitleKind::Movie),
        q: Some("comedy".into()),
        ..ContentFilter::default()
    });
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].title, "Beta");
}

#[test]
fn pagination_is_one_based_and_clamped() {
    let catalog = catalog();
    let total = catalog.analytics().total_titles;

    let first = catalog.admin_titles(&ContentFilter { per_page: Some(4), ..ContentFilter::default() });
    assert_eq!(first.page, 1);
    assert_eq!(first.items.len(), total.min(4));
    assert_eq!(first.total_pages, total.div_ceil(4));

    let zero = catalog.admin_titles(&ContentFilter { page: Some(0), per_page: Some(0), ..ContentFilter::default() });
    assert_eq!(zero.page, 1);
    assert_eq!(zero.per_page, 1);

    let huge = catalog.admin_titles(&ContentFilter { per_page: Some(10_000), ..ContentFilter::default() });
    assert_eq!(huge.per_page, MAX_PAGE_SIZE);

    let past_end = catalog.admin_titles(&ContentFilter { page: Some(99), ..ContentFilter::default() });
    assert!(past_end.items.is_empty());
    assert_eq!(past_end.total, total);
}

#[test]
fn default_page_size() {
    assert_eq!(PageRequest::default().resolve(), (1, DEFAULT_PAGE_SIZE));
}

#[test]
fn admin_users_filter_by_name_or_email() {
    let catalog = Catalog::from_yaml(SMALL).unwrap();
    assert_eq!(catalog.admin_users(&UserFilter::default()).total, 2);
    let page = catalog.admin_users(&UserFilter { q: Some("hill".into()), ..UserFilter::default() });
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].email, "sam@x.test");
    let page = catalog.admin_users(&UserFilter { q: Some("ROOT@".into()), ..UserFilter::default() });
    assert_eq!(page.items[0].name, "Root");
}

#[test]
fn analytics_aggregates() {
    let catalog = Catalog::from_yaml(SMALL).unwrap();
    let stats = catalog.analytics();
    assert_eq!(stats.total_titles, 3);
    assert_eq!(stats.movies, 2);
    assert_eq!(stats.series, 1);
    assert_eq!(stats.total_views, 60);
    assert_eq!(stats.titles_by_genre.get("Drama"), Some(&2));
    assert_eq!(stats.titles_by_genre.get("Comedy"), Some(&2));
    let top: Vec<_> = stats.top_titles.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(top, vec!["Beta", "Gamma", "Alpha"]);
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.admins, 1);
    assert_eq!(stats.suspended_users, 1);
    assert_eq!(stats.total_profiles, 3);
}

#[test]
fn content_filter_deserializes_camel_case() {
    let filter: ContentFilter = serde_json::from_value(serde_json::json!({ "kind": "series", "perPage": 5 })).unwrap();
    assert_eq!(filter.kind, Some(TitleKind::Series));
    assert_eq!(filter.per_page, Some(5));
}
