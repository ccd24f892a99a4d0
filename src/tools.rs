use serde_json::Value;

pub const TOOL_NAVIGATE: &str = "browser_navigate";
pub const TOOL_CLICK: &str = "browser_click";
pub const TOOL_TYPE: &str = "browser_type";
pub const TOOL_PRESS_KEY: &str = "browser_press_key";
pub const TOOL_SNAPSHOT: &str = "browser_snapshot";
pub const TOOL_SCREENSHOT: &str = "browser_take_screenshot";
pub const TOOL_HOVER: &str = "browser_hover";
pub const TOOL_SELECT_OPTION: &str = "browser_select_option";
pub const TOOL_FILL_FORM: &str = "browser_fill_form";
pub const TOOL_EVALUATE: &str = "browser_evaluate";

/// Older Playwright MCP builds exposed the screenshot tool under this name.
const LEGACY_SCREENSHOT: &str = "playwright_screenshot";

/// Browser actions the runner knows how to describe and special-case.
/// Anything else the server advertises is still callable as `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserTool {
    Navigate,
    Click,
    Type,
    PressKey,
    Snapshot,
    Screenshot,
    Hover,
    SelectOption,
    FillForm,
    Unknown(String),
}

impl BrowserTool {
    pub fn from_name(name: &str) -> Self {
        match name {
            TOOL_NAVIGATE => Self::Navigate,
            TOOL_CLICK => Self::Click,
            TOOL_TYPE => Self::Type,
            TOOL_PRESS_KEY => Self::PressKey,
            TOOL_SNAPSHOT => Self::Snapshot,
            TOOL_SCREENSHOT | LEGACY_SCREENSHOT => Self::Screenshot,
            TOOL_HOVER => Self::Hover,
            TOOL_SELECT_OPTION => Self::SelectOption,
            TOOL_FILL_FORM => Self::FillForm,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Navigate => TOOL_NAVIGATE,
            Self::Click => TOOL_CLICK,
            Self::Type => TOOL_TYPE,
            Self::PressKey => TOOL_PRESS_KEY,
            Self::Snapshot => TOOL_SNAPSHOT,
            Self::Screenshot => TOOL_SCREENSHOT,
            Self::Hover => TOOL_HOVER,
            Self::SelectOption => TOOL_SELECT_OPTION,
            Self::FillForm => TOOL_FILL_FORM,
            Self::Unknown(name) => name,
        }
    }

    pub fn is_screenshot(&self) -> bool {
        matches!(self, Self::Screenshot)
    }

    /// Human-readable step label for a call with the given input.
    pub fn describe(&self, input: &Value) -> String {
        match self {
            Self::Navigate => format!("Navigate to {}", arg(input, "url")),
            Self::Click => format!("Click on \"{}\"", target(input)),
            Self::Type => format!(
                "Type \"{}\" into \"{}\"",
                arg(input, "text"),
                target(input)
            ),
            Self::PressKey => format!("Press {}", arg(input, "key")),
            Self::Snapshot => "Get page snapshot".to_string(),
            Self::Screenshot => "Take screenshot".to_string(),
            Self::Hover => format!("Hover over \"{}\"", target(input)),
            Self::SelectOption => format!(
                "Select \"{}\" in \"{}\"",
                arg(input, "values"),
                target(input)
            ),
            Self::FillForm => "Fill form fields".to_string(),
            Self::Unknown(name) => format!("{name}({input})"),
        }
    }
}

fn arg(input: &Value, key: &str) -> String {
    match input.get(key) {
        None | Some(Value::Null) => "?".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join(","),
        Some(other) => other.to_string(),
    }
}

fn target(input: &Value) -> String {
    match input.get("element").and_then(Value::as_str) {
        Some(e) if !e.is_empty() => e.to_string(),
        _ => arg(input, "ref"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::BrowserTool;

    #[test]
    fn names_round_trip_and_unknown_is_preserved() {
        for name in [
            "browser_navigate",
            "browser_click",
            "browser_type",
            "browser_take_screenshot",
            "browser_fill_form",
        ] {
            assert_eq!(BrowserTool::from_name(name).name(), name);
        }
        let t = BrowserTool::from_name("browser_drag");
        assert_eq!(t, BrowserTool::Unknown("browser_drag".to_string()));
        assert_eq!(t.name(), "browser_drag");
    }

    #[test]
    fn legacy_screenshot_name_is_a_screenshot() {
        assert!(BrowserTool::from_name("playwright_screenshot").is_screenshot());
        assert!(!BrowserTool::from_name("browser_snapshot").is_screenshot());
    }

    #[test]
    fn descriptions_prefer_element_over_ref() {
        let click = BrowserTool::Click;
        assert_eq!(
            click.describe(&json!({"element":"Login button","ref":"e12"})),
            "Click on \"Login button\""
        );
        assert_eq!(click.describe(&json!({"ref":"e12"})), "Click on \"e12\"");
        assert_eq!(
            BrowserTool::Type.describe(&json!({"text":"alice","ref":"e3"})),
            "Type \"alice\" into \"e3\""
        );
        assert_eq!(
            BrowserTool::SelectOption.describe(&json!({"element":"Country","values":["DE","FR"]})),
            "Select \"DE,FR\" in \"Country\""
        );
        assert_eq!(
            BrowserTool::Navigate.describe(&json!({"url":"https://x"})),
            "Navigate to https://x"
        );
    }

    #[test]
    fn unknown_tool_describes_with_raw_input() {
        let d = BrowserTool::from_name("browser_wait_for").describe(&json!({"time":2}));
        assert_eq!(d, "browser_wait_for({\"time\":2})");
    }
}
