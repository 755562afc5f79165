use std::fmt;
use woothee::parser::Parser;

/// Lowercase substrings for automated agents woothee does not report as crawlers.
const BOT_TOKENS: &[&str] = &[
    "bot/",
    "bot;",
    "crawl",
    "spider",
    "slurp",
    "mediapartners",
    "facebookexternalhit",
    "bingpreview",
    "headless",
    "lighthouse",
    "curl/",
    "wget/",
    "python-requests",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    IPhone,
    IPad,
    Android,
    Mac,
    Windows,
    Linux,
    Desktop,
}

impl Device {
    // Order matters: iOS agents mention "Mac OS X" and Android agents mention "Linux".
    fn detect(ua: &str) -> Self {
        if ua.contains("iPhone") {
            Self::IPhone
        } else if ua.contains("iPad") {
            Self::IPad
        } else if ua.contains("Android") {
            Self::Android
        } else if ua.contains("Mac") {
            Self::Mac
        } else if ua.contains("Windows") {
            Self::Windows
        } else if ua.contains("Linux") {
            Self::Linux
        } else {
            Self::Desktop
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IPhone => "iPhone",
            Self::IPad => "iPad",
            Self::Android => "Android",
            Self::Mac => "Mac",
            Self::Windows => "Windows",
            Self::Linux => "Linux",
            Self::Desktop => "Desktop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Browser {
    Edge,
    Chrome,
    Safari,
    Firefox,
    InternetExplorer,
    Other,
}

impl Browser {
    // Edge carries a Chrome token and Chrome carries a Safari token.
    fn detect(ua: &str) -> Self {
        let edge = ua.contains("Edg");
        let chrome = ua.contains("Chrome") || ua.contains("CriOS");

        if edge {
            Self::Edge
        } else if chrome {
            Self::Chrome
        } else if ua.contains("Safari") {
            Self::Safari
        } else if ua.contains("Firefox") || ua.contains("FxiOS") {
            Self::Firefox
        } else if ua.contains("MSIE") || ua.contains("Trident") {
            Self::InternetExplorer
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edge => "Edge",
            Self::Chrome => "Chrome",
            Self::Safari => "Safari",
            Self::Firefox => "Firefox",
            Self::InternetExplorer => "IE",
            Self::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentClass {
    Bot,
    Unknown,
    Client { device: Device, browser: Browser },
}

impl fmt::Display for AgentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bot => write!(f, "Bot"),
            Self::Unknown => write!(f, "Unknown"),
            Self::Client { device, browser } => {
                write!(f, "{} / {}", device.as_str(), browser.as_str())
            }
        }
    }
}

pub fn is_bot(user_agent: &str) -> bool {
    let crawler = Parser::new().parse(user_agent).is_some_and(|result| {
        let name = result.name.to_lowercase();
        result.category == "crawler" || name.contains("bot") || name.contains("spider")
    });
    if crawler {
        return true;
    }

    let lowered = user_agent.to_lowercase();
    BOT_TOKENS.iter().any(|token| lowered.contains(token))
}

/// Classifies a raw user-agent string. Total and side-effect free.
pub fn classify(user_agent: &str) -> AgentClass {
    let ua = user_agent.trim();
    if ua.is_empty() || ua.eq_ignore_ascii_case("unknown") {
        return AgentClass::Unknown;
    }

    if is_bot(ua) {
        return AgentClass::Bot;
    }

    AgentClass::Client {
        device: Device::detect(ua),
        browser: Browser::detect(ua),
    }
}

/// Short dashboard label such as `"iPhone / Safari"`, `"Bot"` or `"Unknown"`.
pub fn device_label(user_agent: Option<&str>) -> String {
    classify(user_agent.unwrap_or_default()).to_string()
}
