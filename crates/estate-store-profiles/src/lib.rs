use url::Url;

/// Which realtime-database deployment a chat service talks to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum StoreNamespace {
    /// Admin/resident conversations about anything.
    General,
    /// Conversations scoped to a locker item.
    Locker,
}

impl StoreNamespace {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreNamespace::General => "general",
            StoreNamespace::Locker => "locker",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "general" => Some(StoreNamespace::General),
            "locker" => Some(StoreNamespace::Locker),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StoreProfile {
    pub namespace: StoreNamespace,
    pub name: &'static str,
    pub database_url: &'static str,
    pub rooms_root: &'static str,
}

impl StoreProfile {
    pub fn parsed_url(self) -> Result<Url, url::ParseError> {
        Url::parse(self.database_url)
    }

    /// Database URL, replaced by `override_url` when it parses.
    pub fn resolve_url(self, override_url: Option<&str>) -> Result<Url, url::ParseError> {
        match override_url
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| Url::parse(s).ok())
        {
            Some(url) => Ok(url),
            None => self.parsed_url(),
        }
    }
}

pub const GENERAL_CHAT: StoreProfile = StoreProfile {
    namespace: StoreNamespace::General,
    name: "general-chat",
    database_url: "https://estate-chat-default-rtdb.firebaseio.com",
    rooms_root: "chatRooms",
};

pub const LOCKER_CHAT: StoreProfile = StoreProfile {
    namespace: StoreNamespace::Locker,
    name: "locker-chat",
    database_url: "https://estate-locker-chat-default-rtdb.firebaseio.com",
    rooms_root: "chatRooms",
};

pub fn profile_for(namespace: StoreNamespace) -> StoreProfile {
    match namespace {
        StoreNamespace::General => GENERAL_CHAT,
        StoreNamespace::Locker => LOCKER_CHAT,
    }
}

pub fn all_profiles() -> [StoreProfile; 2] {
    [GENERAL_CHAT, LOCKER_CHAT]
}
