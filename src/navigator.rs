/// Hook the client uses to send the user back to the sign-in screen once the
/// session cannot be renewed. Outside a UI there is nowhere to go.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, route: &str) {
        tracing::debug!(route, "no navigator installed; ignoring redirect");
    }
}

impl<F> Navigator for F
where
    F: Fn(&str) + Send + Sync,
{
    fn navigate(&self, route: &str) {
        self(route)
    }
}
