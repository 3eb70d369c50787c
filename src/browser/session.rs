use crate::{browser::{ClickMethod, ElementRef, PageDriver,
                      config::{ConnectionOptions, LaunchOptions}},
            error::{HarvestError, Result},
            poll::{PollBudget, poll_until}};
use headless_chrome::{Browser, Tab, protocol::cdp::Page};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::{ffi::OsStr, sync::Arc, time::Duration};

const QUERY_ELEMENTS_JS: &str = include_str!("js/query_elements.js");
const ELEMENT_CALL_JS: &str = include_str!("js/element_call.js");
const LOAD_STATE_JS: &str = include_str!("js/load_state.js");

/// Attribute the query script stamps on every element it hands out
const REF_ATTRIBUTE: &str = "data-harvest-ref";

/// Interval between two load-state samples while waiting for network quiescence
const IDLE_SAMPLE_MS: u64 = 250;

/// Envelope every injected script replies with
#[derive(Debug, Deserialize)]
struct ScriptReply {
    ok: bool,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct LoadState {
    ready: String,
    resources: u64,
}

/// Browser session that drives one Chrome/Chromium tab
pub struct BrowserSession {
    /// The underlying headless_chrome Browser instance; dropping it shuts Chrome down
    browser: Browser,

    /// Tab all page operations run against
    tab: Arc<Tab>,
}

impl BrowserSession {
    /// Launch a new browser instance with the given options
    pub fn launch(options: LaunchOptions) -> Result<Self> {
        let mut launch_opts = headless_chrome::LaunchOptions::default();

        // Ignore default arguments to prevent detection by anti-bot services
        launch_opts.ignore_default_args.push(OsStr::new("--enable-automation"));
        launch_opts.args.push(OsStr::new("--disable-blink-features=AutomationControlled"));

        // A full run easily outlives the default 30 second idle timeout
        launch_opts.idle_browser_timeout = Duration::from_secs(60 * 60);

        launch_opts.headless = options.headless;
        launch_opts.window_size = Some((options.window_width, options.window_height));
        launch_opts.sandbox = options.sandbox;

        if let Some(path) = options.chrome_path.clone() {
            launch_opts.path = Some(path);
        }

        if let Some(dir) = options.user_data_dir.clone() {
            launch_opts.user_data_dir = Some(dir);
        }

        let browser = Browser::new(launch_opts).map_err(|e| HarvestError::LaunchFailed(e.to_string()))?;

        let tab = browser.new_tab().map_err(|e| HarvestError::LaunchFailed(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(options.call_timeout());

        Ok(Self { browser, tab })
    }

    /// Connect to an existing browser instance via WebSocket
    pub fn connect(options: ConnectionOptions) -> Result<Self> {
        let browser =
            Browser::connect(options.ws_url.clone()).map_err(|e| HarvestError::ConnectionFailed(e.to_string()))?;

        let tab = browser
            .new_tab()
            .map_err(|e| HarvestError::ConnectionFailed(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(options.call_timeout());

        Ok(Self { browser, tab })
    }

    /// Get the tab this session drives
    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    /// Get the underlying Browser instance
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Wait for the current navigation to complete
    pub fn wait_for_navigation(&self) -> Result<()> {
        self.tab
            .wait_until_navigated()
            .map_err(|e| HarvestError::NavigationFailed(format!("Navigation timeout: {}", e)))?;

        Ok(())
    }

    /// Evaluate a script and return its raw value (`Null` when the script returns nothing)
    fn evaluate_raw(&self, script: &str) -> Result<Value> {
        let remote_object =
            self.tab.evaluate(script, false).map_err(|e| HarvestError::EvaluationFailed(e.to_string()))?;

        Ok(remote_object.value.unwrap_or(Value::Null))
    }

    /// Evaluate one of the bundled scripts, which reply with a JSON-encoded [`ScriptReply`]
    fn evaluate_reply<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        let value = self.evaluate_raw(script)?;

        // The scripts return a JSON string, so parse it as a string first
        let json_str: String = serde_json::from_value(value)
            .map_err(|e| HarvestError::EvaluationFailed(format!("Script did not return a JSON string: {}", e)))?;
        let reply: ScriptReply = serde_json::from_str(&json_str)?;

        if !reply.ok {
            let reason = reply.error.unwrap_or_else(|| "unknown script error".to_string());
            if reason.starts_with("stale element reference") {
                return Err(HarvestError::ElementNotFound(reason));
            }
            return Err(HarvestError::ScriptReply(reason));
        }

        Ok(serde_json::from_value(reply.value.unwrap_or(Value::Null))?)
    }

    fn element_call<T: DeserializeOwned>(&self, element: ElementRef, action: &str, arg: Value) -> Result<T> {
        let script = format!("({})({}, {}, {})", ELEMENT_CALL_JS, element.0, json!(action), arg);
        self.evaluate_reply(&script)
    }

    fn native_click(&self, element: ElementRef) -> Result<()> {
        let css = format!("[{}=\"{}\"]", REF_ATTRIBUTE, element.0);
        let node = self
            .tab
            .find_element(&css)
            .map_err(|e| HarvestError::ElementNotFound(format!("Element {} not found: {}", element, e)))?;

        node.click().map_err(|e| HarvestError::TabOperationFailed(format!("Click on {} failed: {}", element, e)))?;

        Ok(())
    }

    fn load_state(&self) -> Result<LoadState> {
        self.evaluate_reply(LOAD_STATE_JS)
    }
}

impl PageDriver for BrowserSession {
    fn navigate(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| HarvestError::NavigationFailed(format!("Failed to navigate to {}: {}", url, e)))?;

        self.wait_for_navigation()
    }

    fn wait_for_network_idle(&self, timeout: Duration) -> Result<()> {
        let attempts = (timeout.as_millis() as u64 / IDLE_SAMPLE_MS).max(1) as u32;
        let mut previous: Option<LoadState> = None;

        // Quiet once the document is complete and no new resource entries showed up between two samples
        let settled = poll_until(PollBudget::new(attempts, IDLE_SAMPLE_MS), |_| {
            let state = match self.load_state() {
                Ok(state) => state,
                Err(e) => {
                    log::debug!("Failed to sample load state: {}", e);
                    return None;
                }
            };
            let quiet = state.ready == "complete" && previous.as_ref() == Some(&state);
            previous = Some(state);
            quiet.then_some(())
        });

        settled.ok_or_else(|| HarvestError::Timeout(format!("network idle after {:?}", timeout)))
    }

    fn query_all(&self, scope: Option<ElementRef>, css: &str) -> Result<Vec<ElementRef>> {
        let scope_arg = scope.map_or(Value::Null, |el| json!(el.0));
        let script = format!("({})({}, {})", QUERY_ELEMENTS_JS, scope_arg, json!(css));
        let refs: Vec<u64> = self.evaluate_reply(&script)?;

        Ok(refs.into_iter().map(ElementRef).collect())
    }

    fn text_content(&self, element: ElementRef) -> Result<String> {
        self.element_call(element, "text", Value::Null)
    }

    fn inner_html(&self, element: ElementRef) -> Result<String> {
        self.element_call(element, "html", Value::Null)
    }

    fn attribute(&self, element: ElementRef, name: &str) -> Result<Option<String>> {
        self.element_call(element, "attribute", json!(name))
    }

    fn tag_name(&self, element: ElementRef) -> Result<String> {
        self.element_call(element, "tag", Value::Null)
    }

    fn computed_style(&self, element: ElementRef, property: &str) -> Result<String> {
        self.element_call(element, "style", json!(property))
    }

    fn is_visible(&self, element: ElementRef) -> Result<bool> {
        self.element_call(element, "visible", Value::Null)
    }

    fn click(&self, element: ElementRef, method: ClickMethod) -> Result<()> {
        let action = match method {
            ClickMethod::Native => return self.native_click(element),
            ClickMethod::Forced => "forced_click",
            ClickMethod::Scripted => "scripted_click",
            ClickMethod::Double => "double_click",
        };
        let _: bool = self.element_call(element, action, Value::Null)?;
        Ok(())
    }

    fn press_key(&self, key: &str) -> Result<()> {
        self.tab
            .press_key(key)
            .map_err(|e| HarvestError::TabOperationFailed(format!("Failed to press {}: {}", key, e)))?;

        Ok(())
    }

    fn evaluate(&self, script: &str) -> Result<Value> {
        self.evaluate_raw(script)
    }

    fn capture_screenshot(&self) -> Result<Vec<u8>> {
        self.tab
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| HarvestError::TabOperationFailed(format!("Screenshot failed: {}", e)))
    }

    fn close(&self) -> Result<()> {
        // headless_chrome has no explicit browser shutdown; Chrome exits when `Browser` drops
        self.tab
            .close(true)
            .map_err(|e| HarvestError::TabOperationFailed(format!("Failed to close tab: {}", e)))?;

        Ok(())
    }
}
