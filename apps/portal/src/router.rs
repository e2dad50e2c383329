//! Static route table mapping URL paths to views.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Home,
    About,
    ComingSoon,
    Admin,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewProps {
    pub title: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub path: &'static str,
    pub name: &'static str,
    pub view: View,
    pub props: Option<ViewProps>,
}

const fn route(path: &'static str, name: &'static str, view: View) -> Route {
    Route {
        path,
        name,
        view,
        props: None,
    }
}

const fn coming_soon(path: &'static str, name: &'static str, title: &'static str) -> Route {
    Route {
        path,
        name,
        view: View::ComingSoon,
        props: Some(ViewProps { title }),
    }
}

pub static ROUTES: [Route; 7] = [
    route("/", "home", View::Home),
    route("/about", "about", View::About),
    coming_soon("/my-courses", "my-courses", "Мои курсы"),
    coming_soon("/courses", "courses", "Каталог курсов"),
    coming_soon("/sales", "sales", "Акции"),
    coming_soon("/profile", "profile", "Профиль"),
    route("/admin", "admin", View::Admin),
];

pub static NOT_FOUND: Route = route("*", "not-found", View::NotFound);

/// Case-insensitive match after dropping the query string, the fragment and
/// a trailing slash. Anything else lands on [`NOT_FOUND`].
pub fn resolve(path: &str) -> &'static Route {
    let path = normalize(path);
    ROUTES
        .iter()
        .find(|route| route.path.eq_ignore_ascii_case(path))
        .unwrap_or(&NOT_FOUND)
}

pub fn by_name(name: &str) -> Option<&'static Route> {
    ROUTES
        .iter()
        .chain(std::iter::once(&NOT_FOUND))
        .find(|route| route.name == name)
}

fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
