use super::*;

// =============================================================================
// normalize
// =============================================================================

#[test]
fn normalize_strips_query_fragment_and_trailing_slash() {
    assert_eq!(normalize("/analyze/?tab=reviews#top"), "/analyze");
    assert_eq!(normalize("/connexion/"), "/connexion");
}

#[test]
fn normalize_keeps_root() {
    assert_eq!(normalize("/"), "/");
    assert_eq!(normalize("/?ref=ad"), "/");
    assert_eq!(normalize(""), "/");
}

#[test]
fn prefix_language_reads_fr_segment_only() {
    assert_eq!(prefix_language("/fr"), Language::Fr);
    assert_eq!(prefix_language("/fr/tableau-de-bord?x=1"), Language::Fr);
    assert_eq!(prefix_language("/fresh"), Language::En);
    assert_eq!(prefix_language("/"), Language::En);
}

// =============================================================================
// match_route
// =============================================================================

#[test]
fn match_route_finds_french_login() {
    let m = match_route("/connexion").unwrap();
    assert_eq!(m.route, Route::Login);
    assert_eq!(m.language, Language::Fr);
    assert_eq!(m.rest, "");
}

#[test]
fn match_route_keeps_sub_path_remainder() {
    let m = match_route("/mes-etablissements/42/reviews").unwrap();
    assert_eq!(m.route, Route::MyEstablishments);
    assert_eq!(m.language, Language::Fr);
    assert_eq!(m.rest, "/42/reviews");
}

#[test]
fn match_route_prefers_longest_prefix() {
    let m = match_route("/fr/auth/callback").unwrap();
    assert_eq!(m.route, Route::AuthCallback);
    assert_eq!(m.language, Language::Fr);
}

#[test]
fn match_route_home_is_exact_only() {
    assert_eq!(match_route("/").unwrap().route, Route::Home);
    assert_eq!(match_route("/fr").unwrap().route, Route::Home);
    assert!(match_route("/fr/unknown").is_none());
    assert!(match_route("/unknown").is_none());
}

#[test]
fn match_route_requires_segment_boundary() {
    assert!(match_route("/loginx").is_none());
    assert!(match_route("/analyzer").is_none());
}

// =============================================================================
// StaticRoutes
// =============================================================================

#[test]
fn language_of_defaults_to_english_without_locale() {
    let routes = StaticRoutes;
    assert_eq!(routes.language_of("/my-establishments"), Language::En);
    assert_eq!(routes.language_of("/totally-unknown"), Language::En);
    assert_eq!(routes.language_of("/analyser"), Language::Fr);
}

#[test]
fn localize_swaps_route_and_keeps_remainder() {
    let routes = StaticRoutes;
    assert_eq!(routes.localize("/analyze", Language::Fr), "/analyser");
    assert_eq!(routes.localize("/connexion", Language::En), "/login");
    assert_eq!(routes.localize("/my-establishments/7", Language::Fr), "/mes-etablissements/7");
}

#[test]
fn localize_leaves_unknown_paths_untouched() {
    assert_eq!(StaticRoutes.localize("/robots.txt", Language::Fr), "/robots.txt");
    assert_eq!(StaticRoutes.localize("/robots.txt?v=2#a", Language::Fr), "/robots.txt?v=2#a");
}

#[test]
fn localize_keeps_query_and_fragment() {
    let routes = StaticRoutes;
    assert_eq!(routes.localize("/login?next=/analyze#top", Language::Fr), "/connexion?next=/analyze#top");
    assert_eq!(routes.localize("/mes-etablissements/7/#reviews", Language::En), "/my-establishments/7#reviews");
    assert_eq!(routes.localize("/analyser", Language::En), "/analyze");
}

#[test]
fn unknown_french_prefixed_paths_are_french_and_protected() {
    let routes = StaticRoutes;
    assert_eq!(routes.language_of("/fr/tableau-de-bord"), Language::Fr);
    assert_eq!(routes.language_of("/fr/tableau-de-bord/"), Language::Fr);
    assert!(!routes.is_public("/fr/tableau-de-bord"));
    assert!(!routes.is_auth_form("/fr/tableau-de-bord"));
    assert_eq!(routes.language_of("/french-fries"), Language::En);
}

#[test]
fn public_allow_list_covers_marketing_and_auth_pages() {
    let routes = StaticRoutes;
    for path in [
        "/",
        "/fr",
        "/login",
        "/connexion",
        "/signup",
        "/inscription",
        "/reset-password",
        "/reinitialiser-mot-de-passe",
        "/auth/callback",
        "/fr/auth/callback",
        "/about",
        "/a-propos",
        "/contact",
        "/nous-contacter",
        "/book-a-demo",
        "/reserver-une-demo",
    ] {
        assert!(routes.is_public(path), "{path} should be public");
    }
}

#[test]
fn dashboard_and_unknown_paths_are_protected() {
    let routes = StaticRoutes;
    for path in ["/analyze", "/analyser", "/my-establishments", "/mon-compte", "/nowhere"] {
        assert!(!routes.is_public(path), "{path} should be protected");
    }
}

#[test]
fn auth_form_paths_are_login_and_signup_in_both_languages() {
    let routes = StaticRoutes;
    for path in ["/login", "/signup", "/connexion", "/inscription", "/login?next=/analyze"] {
        assert!(routes.is_auth_form(path), "{path} should be an auth form");
    }
    assert!(!routes.is_auth_form("/reset-password"));
    assert!(!routes.is_auth_form("/analyze"));
}

#[test]
fn route_path_returns_localized_landing() {
    assert_eq!(StaticRoutes.route_path(Route::Analyze, Language::En), "/analyze");
    assert_eq!(StaticRoutes.route_path(Route::Analyze, Language::Fr), "/analyser");
    assert_eq!(Route::Login.path(Language::Fr), "/connexion");
}

#[test]
fn language_displays_as_lowercase_code() {
    assert_eq!(Language::Fr.to_string(), "fr");
    assert_eq!(serde_json::to_string(&Language::En).unwrap(), "\"en\"");
}
