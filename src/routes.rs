pub const LOGIN: &str = "/auth/login";
pub const REGISTER: &str = "/auth/register";
pub const FORGOT_PASSWORD: &str = "/auth/forgot-password";
pub const RESET_PASSWORD: &str = "/auth/reset-password";
pub const VERIFY_EMAIL: &str = "/auth/verify-email";
pub const REFRESH_TOKEN: &str = "/auth/refresh-token";
pub const LOGOUT: &str = "/auth/logout";

/// Routes that are called before a session exists and never carry a bearer token.
const PUBLIC_ROUTES: [&str; 6] = [
    LOGIN,
    REGISTER,
    FORGOT_PASSWORD,
    RESET_PASSWORD,
    VERIFY_EMAIL,
    REFRESH_TOKEN,
];

/// Routes whose tokens start a new session instead of rotating the current one.
const SESSION_START_ROUTES: [&str; 2] = [LOGIN, REGISTER];

fn normalize_path(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

pub fn is_public_route(path: &str) -> bool {
    let path = normalize_path(path);
    PUBLIC_ROUTES.iter().any(|route| *route == path)
}

pub fn starts_session(path: &str) -> bool {
    let path = normalize_path(path);
    SESSION_START_ROUTES.iter().any(|route| *route == path)
}
