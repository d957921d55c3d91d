//! 解析器的性质测试。

use proptest::prelude::*;
use trellis_router::resolver::RoutingResolver;

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,8}"
}

fn path() -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 1..5).prop_map(|segments| segments.join("/"))
}

proptest! {
    #[test]
    fn plain_fragments_never_resolve_a_view(prefix in path(), anchor in "[a-z][a-z0-9-]{0,12}") {
        let route = RoutingResolver::default().resolve(&format!("{prefix}#{anchor}"));
        prop_assert!(route.is_plain_hash);
        prop_assert!(route.view.is_empty());
        prop_assert!(route.controller_script.is_none());
    }

    #[test]
    fn trailing_slash_resolves_to_index(path in path()) {
        let route = RoutingResolver::default().resolve(&format!("#!{path}/"));
        prop_assert!(route.view.ends_with("/index.html"), "view = {}", route.view);
        prop_assert!(route.controller_script.as_deref().is_some_and(|s| s.ends_with("/index.js")));
        prop_assert_eq!(route.controller_name.as_deref(), Some("index"));
    }

    #[test]
    fn resolution_is_pure(path in path(), key in segment(), value in "[a-z0-9]{0,6}") {
        let resolver = RoutingResolver::default();
        let url = format!("{path}?{key}={value}");
        let first = resolver.resolve(&url);
        let second = resolver.resolve(&url);
        prop_assert_eq!(&first, &second);
        prop_assert!(!first.view.is_empty());
        prop_assert!(first.view.starts_with("views/"));
    }

    #[test]
    fn hash_round_trips_to_the_same_route(path in path()) {
        let resolver = RoutingResolver::default();
        let clicked = resolver.resolve(&path);
        let restored = resolver.resolve(&clicked.hash);
        prop_assert_eq!(&clicked.view, &restored.view);
        prop_assert_eq!(&clicked.controller_script, &restored.controller_script);
        prop_assert_eq!(&clicked.hash, &restored.hash);
    }
}
