//! Named client views and the session signal that selects between them.

/// Top-level client views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum View {
    Dashboard,
    Login,
    Write,
}

impl View {
    pub const ALL: [View; 3] = [View::Dashboard, View::Login, View::Write];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Login => "login",
            Self::Write => "write",
        }
    }

    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Dashboard => "/",
            Self::Login => "/login",
            Self::Write => "/write",
        }
    }

    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.path() == path)
    }

    /// Where the client lands for a given authentication state.
    #[must_use]
    pub fn landing(authenticated: bool) -> Self {
        if authenticated {
            Self::Dashboard
        } else {
            Self::Login
        }
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
