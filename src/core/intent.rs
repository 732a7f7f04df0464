//! Local intent recognition for client text messages.
//!
//! Text is lowercased once and run through [`RULES`] in order; the first
//! matching rule decides the intent and nothing later is consulted. Text
//! that matches no rule is forwarded upstream unchanged.
//!
//! The order is significant. The bare-arithmetic branch of the calculator
//! rule accepts anything made of digits and operators, so every rule that
//! recognises a keyword must run before anything it could shadow.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::tools::ChartKind;

static WEATHER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"weather(?: in ([a-zA-Z\s]+))?").expect("valid regex"));

static BARE_ARITHMETIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+[\d\s\+\-\*/\(\)\.]*$").expect("valid regex"));

static CALCULATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"calculate (.+)").expect("valid regex"));

static BUTTON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"turn (on|off) (light 1|light 2|fan)").expect("valid regex")
});

static WORD_CLOUD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:word cloud|generate word cloud)(?: for|:)?\s*(.*)").expect("valid regex")
});

static BAR_CHART_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bar chart[:\s]+([\d,\s\.]+)").expect("valid regex"));

static LINE_CHART_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"line chart[:\s]+([\d,\s\.]+)").expect("valid regex"));

static PIE_CHART_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pie chart[:\s]+([\d,\s\.]+)").expect("valid regex"));

const NEXT_WORDS: &[&str] = &["next", "go to next", "forward"];
const PREV_WORDS: &[&str] = &["previous", "prev", "go to previous", "back"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarouselDirection {
    Next,
    Prev,
}

impl CarouselDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarouselDirection::Next => "next",
            CarouselDirection::Prev => "prev",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    On,
    Off,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::On => "on",
            DeviceState::Off => "off",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A locally handled request.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Time,
    /// `None` means the configured default city
    Weather { city: Option<String> },
    Calculate { expr: String },
    Carousel(CarouselDirection),
    DeviceButton { name: String, state: DeviceState },
    WordCloud { text: String },
    /// Raw comma-separated tokens; parsing happens in the executor
    Chart { kind: ChartKind, values: Vec<String> },
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Time => "time",
            Intent::Weather { .. } => "weather",
            Intent::Calculate { .. } => "calculator",
            Intent::Carousel(_) => "carousel",
            Intent::DeviceButton { .. } => "button",
            Intent::WordCloud { .. } => "word_cloud",
            Intent::Chart { kind, .. } => match kind {
                ChartKind::Bar => "bar_chart",
                ChartKind::Line => "line_chart",
                ChartKind::Pie => "pie_chart",
            },
        }
    }
}

/// One entry of the interception table.
pub struct InterceptRule {
    pub name: &'static str,
    pub matcher: fn(&str) -> Option<Intent>,
}

/// Interception rules in precedence order. Matchers receive lowercased text.
pub static RULES: &[InterceptRule] = &[
    InterceptRule {
        name: "time",
        matcher: match_time,
    },
    InterceptRule {
        name: "weather",
        matcher: match_weather,
    },
    InterceptRule {
        name: "calculator",
        matcher: match_calculator,
    },
    InterceptRule {
        name: "carousel_next",
        matcher: match_carousel_next,
    },
    InterceptRule {
        name: "carousel_prev",
        matcher: match_carousel_prev,
    },
    InterceptRule {
        name: "button",
        matcher: match_button,
    },
    InterceptRule {
        name: "word_cloud",
        matcher: match_word_cloud,
    },
    InterceptRule {
        name: "bar_chart",
        matcher: match_bar_chart,
    },
    InterceptRule {
        name: "line_chart",
        matcher: match_line_chart,
    },
    InterceptRule {
        name: "pie_chart",
        matcher: match_pie_chart,
    },
];

/// Classify client text. `None` means forward it upstream.
pub fn classify(text: &str) -> Option<Intent> {
    let lowered = text.to_lowercase();
    RULES.iter().find_map(|rule| {
        let intent = (rule.matcher)(&lowered)?;
        tracing::debug!(rule = rule.name, "Intercepted client text");
        Some(intent)
    })
}

fn match_time(text: &str) -> Option<Intent> {
    text.contains("time").then_some(Intent::Time)
}

fn match_weather(text: &str) -> Option<Intent> {
    let caps = WEATHER_RE.captures(text)?;
    let city = caps
        .get(1)
        .map(|m| title_case(m.as_str().trim()))
        .filter(|c| !c.is_empty());
    Some(Intent::Weather { city })
}

fn match_calculator(text: &str) -> Option<Intent> {
    if !text.contains("calculate") && !BARE_ARITHMETIC_RE.is_match(text) {
        return None;
    }
    let expr = CALCULATE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or(text, |m| m.as_str());
    Some(Intent::Calculate {
        expr: expr.to_string(),
    })
}

fn match_carousel_next(text: &str) -> Option<Intent> {
    NEXT_WORDS
        .iter()
        .any(|w| text.contains(w))
        .then_some(Intent::Carousel(CarouselDirection::Next))
}

fn match_carousel_prev(text: &str) -> Option<Intent> {
    PREV_WORDS
        .iter()
        .any(|w| text.contains(w))
        .then_some(Intent::Carousel(CarouselDirection::Prev))
}

fn match_button(text: &str) -> Option<Intent> {
    let caps = BUTTON_RE.captures(text)?;
    let state = if &caps[1] == "on" {
        DeviceState::On
    } else {
        DeviceState::Off
    };
    Some(Intent::DeviceButton {
        name: title_case(&caps[2]),
        state,
    })
}

fn match_word_cloud(text: &str) -> Option<Intent> {
    if !text.contains("word cloud") {
        return None;
    }
    let body = WORD_CLOUD_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(text);
    Some(Intent::WordCloud {
        text: body.to_string(),
    })
}

fn match_bar_chart(text: &str) -> Option<Intent> {
    match_chart(text, ChartKind::Bar, &BAR_CHART_RE)
}

fn match_line_chart(text: &str) -> Option<Intent> {
    match_chart(text, ChartKind::Line, &LINE_CHART_RE)
}

fn match_pie_chart(text: &str) -> Option<Intent> {
    match_chart(text, ChartKind::Pie, &PIE_CHART_RE)
}

fn match_chart(text: &str, kind: ChartKind, re: &Regex) -> Option<Intent> {
    if !text.contains(kind.title()) {
        return None;
    }
    let values = re
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| {
            m.as_str()
                .replace(' ', "")
                .split(',')
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some(Intent::Chart { kind, values })
}

/// Upper-case the first letter of every alphabetic run.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart(kind: ChartKind, values: &[&str]) -> Option<Intent> {
        Some(Intent::Chart {
            kind,
            values: values.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn test_time() {
        assert_eq!(classify("What TIME is it?"), Some(Intent::Time));
        // Time wins over everything after it.
        assert_eq!(classify("weather at this time"), Some(Intent::Time));
    }

    #[test]
    fn test_weather() {
        assert_eq!(
            classify("Weather in new york"),
            Some(Intent::Weather {
                city: Some("New York".to_string())
            })
        );
        assert_eq!(classify("how is the weather"), Some(Intent::Weather { city: None }));
        assert_eq!(
            classify("weather in paris?"),
            Some(Intent::Weather {
                city: Some("Paris".to_string())
            })
        );
    }

    #[test]
    fn test_calculator() {
        assert_eq!(
            classify("calculate 2+2"),
            Some(Intent::Calculate {
                expr: "2+2".to_string()
            })
        );
        assert_eq!(
            classify(" 12 * (3 + 4) "),
            Some(Intent::Calculate {
                expr: " 12 * (3 + 4) ".to_string()
            })
        );
        assert_eq!(
            classify("Calculate __import__('os')"),
            Some(Intent::Calculate {
                expr: "__import__('os')".to_string()
            })
        );
        assert_eq!(
            classify("please calculate"),
            Some(Intent::Calculate {
                expr: "please calculate".to_string()
            })
        );
    }

    #[test]
    fn test_carousel() {
        assert_eq!(
            classify("go to next slide"),
            Some(Intent::Carousel(CarouselDirection::Next))
        );
        assert_eq!(
            classify("go back"),
            Some(Intent::Carousel(CarouselDirection::Prev))
        );
        assert_eq!(
            classify("Previous"),
            Some(Intent::Carousel(CarouselDirection::Prev))
        );
    }

    #[test]
    fn test_button() {
        assert_eq!(
            classify("Please turn on light 2"),
            Some(Intent::DeviceButton {
                name: "Light 2".to_string(),
                state: DeviceState::On
            })
        );
        assert_eq!(
            classify("turn off the fan"),
            None,
            "the device must directly follow the state"
        );
        assert_eq!(
            classify("turn off fan"),
            Some(Intent::DeviceButton {
                name: "Fan".to_string(),
                state: DeviceState::Off
            })
        );
    }

    #[test]
    fn test_word_cloud() {
        assert_eq!(
            classify("generate word cloud for rust is great"),
            Some(Intent::WordCloud {
                text: "rust is great".to_string()
            })
        );
        assert_eq!(
            classify("word cloud: Hello World"),
            Some(Intent::WordCloud {
                text: "hello world".to_string()
            })
        );
        assert_eq!(
            classify("word cloud"),
            Some(Intent::WordCloud {
                text: "word cloud".to_string()
            })
        );
    }

    #[test]
    fn test_charts() {
        assert_eq!(classify("bar chart: 1,2,3"), chart(ChartKind::Bar, &["1", "2", "3"]));
        assert_eq!(
            classify("line chart 1.5, 2 ,3"),
            chart(ChartKind::Line, &["1.5", "2", "3"])
        );
        assert_eq!(classify("pie chart: 4, 5"), chart(ChartKind::Pie, &["4", "5"]));
        assert_eq!(classify("show a pie chart"), chart(ChartKind::Pie, &[]));
    }

    #[test]
    fn test_chart_beats_bare_arithmetic() {
        for text in ["bar chart: 1,2,3", "line chart 10 20", "pie chart: 1.5,2"] {
            assert!(
                matches!(classify(text), Some(Intent::Chart { .. })),
                "text: {text}"
            );
        }
    }

    #[test]
    fn test_forward() {
        assert_eq!(classify("Tell me a joke"), None);
        assert_eq!(classify(""), None);
    }

    #[test]
    fn test_rule_order() {
        let names: Vec<_> = RULES.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            [
                "time",
                "weather",
                "calculator",
                "carousel_next",
                "carousel_prev",
                "button",
                "word_cloud",
                "bar_chart",
                "line_chart",
                "pie_chart"
            ]
        );
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("light 1"), "Light 1");
        assert_eq!(title_case("new YORK"), "New York");
    }
}
