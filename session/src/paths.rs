//! Static EN/FR route table and path classification.
//!
//! DESIGN
//! ======
//! Every user-facing route exists as an English/French pair. A path belongs to
//! the longest route it equals or extends with `/…`; the home route only
//! matches exactly so it does not swallow every other path. Anything outside
//! the table is English and protected.

#[cfg(test)]
#[path = "paths_test.rs"]
mod tests;

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Fr,
}

impl Language {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Fr => "fr",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named routes of the site. Each has one path per language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Login,
    Signup,
    ResetPassword,
    AuthCallback,
    About,
    Contact,
    BookDemo,
    Analyze,
    MyEstablishments,
    Account,
}

struct RouteEntry {
    route: Route,
    en: &'static str,
    fr: &'static str,
    public: bool,
}

const ROUTES: &[RouteEntry] = &[
    RouteEntry { route: Route::Home, en: "/", fr: "/fr", public: true },
    RouteEntry { route: Route::Login, en: "/login", fr: "/connexion", public: true },
    RouteEntry { route: Route::Signup, en: "/signup", fr: "/inscription", public: true },
    RouteEntry { route: Route::ResetPassword, en: "/reset-password", fr: "/reinitialiser-mot-de-passe", public: true },
    RouteEntry { route: Route::AuthCallback, en: "/auth/callback", fr: "/fr/auth/callback", public: true },
    RouteEntry { route: Route::About, en: "/about", fr: "/a-propos", public: true },
    RouteEntry { route: Route::Contact, en: "/contact", fr: "/nous-contacter", public: true },
    RouteEntry { route: Route::BookDemo, en: "/book-a-demo", fr: "/reserver-une-demo", public: true },
    RouteEntry { route: Route::Analyze, en: "/analyze", fr: "/analyser", public: false },
    RouteEntry { route: Route::MyEstablishments, en: "/my-establishments", fr: "/mes-etablissements", public: false },
    RouteEntry { route: Route::Account, en: "/account", fr: "/mon-compte", public: false },
];

impl Route {
    /// Path of this route in the given language.
    #[must_use]
    pub fn path(self, language: Language) -> &'static str {
        let entry = entry_for(self);
        match language {
            Language::En => entry.en,
            Language::Fr => entry.fr,
        }
    }

    /// Whether the route is reachable without a session.
    #[must_use]
    pub fn is_public(self) -> bool {
        entry_for(self).public
    }

    /// Login and signup forms, the pages a fresh sign-in navigates away from.
    #[must_use]
    pub fn is_auth_form(self) -> bool {
        matches!(self, Self::Login | Self::Signup)
    }
}

fn entry_for(route: Route) -> &'static RouteEntry {
    // The table holds one entry per variant.
    ROUTES
        .iter()
        .find(|entry| entry.route == route)
        .unwrap_or(&ROUTES[0])
}

/// Result of matching a concrete path against the route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub route: Route,
    pub language: Language,
    /// Path remainder after the route prefix, e.g. `/42` for `/analyze/42`.
    pub rest: String,
}

/// Strip query string, fragment and trailing slash.
#[must_use]
pub fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

/// Query string and fragment, including the leading `?` or `#`.
fn suffix(path: &str) -> &str {
    path.find(['?', '#']).map_or("", |start| &path[start..])
}

/// Language implied by the locale prefix alone: `/fr` and `/fr/...` are French.
#[must_use]
pub fn prefix_language(path: &str) -> Language {
    let path = normalize(path);
    if path == "/fr" || path.starts_with("/fr/") { Language::Fr } else { Language::En }
}

fn prefix_rest<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix == "/" {
        return (path == "/").then_some("");
    }
    let rest = path.strip_prefix(prefix)?;
    (rest.is_empty() || rest.starts_with('/')).then_some(rest)
}

/// Match `path` against the route table, preferring the longest route.
#[must_use]
pub fn match_route(path: &str) -> Option<RouteMatch> {
    let path = normalize(path);
    let mut best: Option<(usize, RouteMatch)> = None;
    for entry in ROUTES {
        for (language, prefix) in [(Language::En, entry.en), (Language::Fr, entry.fr)] {
            let Some(rest) = prefix_rest(path, prefix) else {
                continue;
            };
            if entry.route == Route::Home && !rest.is_empty() {
                continue;
            }
            if best.as_ref().is_some_and(|(len, _)| *len >= prefix.len()) {
                continue;
            }
            best = Some((prefix.len(), RouteMatch { route: entry.route, language, rest: rest.to_owned() }));
        }
    }
    best.map(|(_, m)| m)
}

/// Classification seam used by the session controller.
pub trait PathClassifier: Send + Sync {
    fn language_of(&self, path: &str) -> Language;
    fn localize(&self, path: &str, language: Language) -> String;
    fn is_public(&self, path: &str) -> bool;
    fn is_auth_form(&self, path: &str) -> bool;

    /// Localized path of a named route.
    fn route_path(&self, route: Route, language: Language) -> String {
        route.path(language).to_owned()
    }
}

/// The built-in route table.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticRoutes;

impl PathClassifier for StaticRoutes {
    fn language_of(&self, path: &str) -> Language {
        match_route(path).map_or_else(|| prefix_language(path), |m| m.language)
    }

    /// Query and fragment survive localization; unknown paths come back as given.
    fn localize(&self, path: &str, language: Language) -> String {
        match match_route(path) {
            Some(m) => format!("{}{}{}", m.route.path(language), m.rest, suffix(path)),
            None => path.to_owned(),
        }
    }

    fn is_public(&self, path: &str) -> bool {
        match_route(path).is_some_and(|m| m.route.is_public())
    }

    fn is_auth_form(&self, path: &str) -> bool {
        match_route(path).is_some_and(|m| m.route.is_auth_form() && m.rest.is_empty())
    }
}
