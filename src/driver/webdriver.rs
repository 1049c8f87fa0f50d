//! WebDriver-backed session driver
//!
//! Speaks the W3C WebDriver wire protocol (JSON over HTTP) against a local
//! driver server such as chromedriver or geckodriver. One `WebDriverSession`
//! corresponds to one browser instance.

use crate::driver::{DriverError, DriverResult, LoginField, SessionDriver, SessionFactory};
use crate::session::CookieRecord;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// XPath matching item links on the timeline
const ITEM_LINK_XPATH: &str = r#"//*/div[2]/div/div[3]/a[@role="link"]"#;

/// XPath of the login link on a logged-out landing page
const LOGIN_LINK_XPATH: &str = r#"//a[@href="/login" and @role="link"]"#;

/// CSS selector for the username input on the login form
const USERNAME_CSS: &str = r#"input[autocomplete="username"]"#;

/// CSS selector for the password input on the login form
const PASSWORD_CSS: &str = r#"input[type="password"]"#;

/// WebDriver key code for Enter
const ENTER_KEY: &str = "\u{E007}";

/// W3C element identifier key in find-element responses
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// How long `focus_field` waits for a login input to appear
const FIELD_WAIT: Duration = Duration::from_secs(20);

/// Poll interval while waiting for an element
const FIELD_POLL: Duration = Duration::from_millis(500);

/// A browser session speaking the WebDriver protocol
pub struct WebDriverSession {
    client: reqwest::Client,
    base: String,
    session_id: String,
    /// Element ids of login inputs located by `focus_field`
    fields: Mutex<HashMap<LoginField, String>>,
}

impl WebDriverSession {
    fn session_url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base, self.session_id, path)
    }

    async fn decode(response: reqwest::Response) -> DriverResult<Value> {
        let status = response.status();
        let body: Value = response.json().await?;
        if status.is_success() {
            return Ok(body["value"].clone());
        }

        let error = body["value"]["error"].as_str().unwrap_or("unknown error");
        let message = body["value"]["message"].as_str().unwrap_or("");
        if error == "no such element" {
            return Err(DriverError::ElementNotFound(message.to_string()));
        }
        Err(DriverError::Protocol(format!("{}: {}", error, message)))
    }

    async fn post(&self, path: &str, body: Value) -> DriverResult<Value> {
        let response = self
            .client
            .post(self.session_url(path))
            .json(&body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn get(&self, path: &str) -> DriverResult<Value> {
        let response = self.client.get(self.session_url(path)).send().await?;
        Self::decode(response).await
    }

    async fn execute(&self, script: &str, args: Value) -> DriverResult<Value> {
        self.post("/execute/sync", json!({ "script": script, "args": args }))
            .await
            .map_err(|e| match e {
                DriverError::Protocol(msg) => DriverError::Script(msg),
                other => other,
            })
    }

    async fn find_element(&self, using: &str, selector: &str) -> DriverResult<String> {
        let value = self
            .post("/element", json!({ "using": using, "value": selector }))
            .await?;
        value[ELEMENT_KEY]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::ElementNotFound(selector.to_string()))
    }

    async fn find_elements(&self, using: &str, selector: &str) -> DriverResult<Vec<String>> {
        let value = self
            .post("/elements", json!({ "using": using, "value": selector }))
            .await?;
        let ids = value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item[ELEMENT_KEY].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    async fn attribute(&self, element_id: &str, name: &str) -> DriverResult<Option<String>> {
        let value = self
            .get(&format!("/element/{}/attribute/{}", element_id, name))
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn send_keys(&self, element_id: &str, text: &str) -> DriverResult<()> {
        self.post(
            &format!("/element/{}/value", element_id),
            json!({ "text": text }),
        )
        .await?;
        Ok(())
    }

    fn field_selector(field: LoginField) -> &'static str {
        match field {
            LoginField::Username => USERNAME_CSS,
            LoginField::Password => PASSWORD_CSS,
        }
    }

    fn cached_field(&self, field: LoginField) -> DriverResult<String> {
        self.fields
            .lock()
            .map_err(|_| DriverError::SessionClosed)?
            .get(&field)
            .cloned()
            .ok_or_else(|| DriverError::ElementNotFound(Self::field_selector(field).to_string()))
    }
}

#[async_trait]
impl SessionDriver for WebDriverSession {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.post("/url", json!({ "url": url }))
            .await
            .map_err(|e| DriverError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn scroll_by(&self, pixels: u32) -> DriverResult<()> {
        self.execute("window.scrollBy(0, arguments[0]);", json!([pixels]))
            .await?;
        Ok(())
    }

    async fn item_links(&self) -> DriverResult<Vec<String>> {
        let ids = self.find_elements("xpath", ITEM_LINK_XPATH).await?;
        let mut links = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(href) = self.attribute(&id, "href").await? {
                links.push(href);
            }
        }
        Ok(links)
    }

    async fn login_page_shown(&self) -> DriverResult<bool> {
        let ids = self.find_elements("css selector", USERNAME_CSS).await?;
        Ok(!ids.is_empty())
    }

    async fn click_login_link(&self) -> DriverResult<()> {
        let id = self.find_element("xpath", LOGIN_LINK_XPATH).await?;
        self.post(&format!("/element/{}/click", id), json!({})).await?;
        Ok(())
    }

    async fn focus_field(&self, field: LoginField) -> DriverResult<()> {
        let selector = Self::field_selector(field);
        let deadline = Instant::now() + FIELD_WAIT;

        loop {
            match self.find_element("css selector", selector).await {
                Ok(id) => {
                    self.fields
                        .lock()
                        .map_err(|_| DriverError::SessionClosed)?
                        .insert(field, id);
                    return Ok(());
                }
                Err(DriverError::ElementNotFound(_)) if Instant::now() < deadline => {
                    tokio::time::sleep(FIELD_POLL).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn type_char(&self, field: LoginField, ch: char) -> DriverResult<()> {
        let id = self.cached_field(field)?;
        self.send_keys(&id, &ch.to_string()).await
    }

    async fn press_enter(&self, field: LoginField) -> DriverResult<()> {
        let id = self.cached_field(field)?;
        self.send_keys(&id, ENTER_KEY).await
    }

    async fn page_text(&self, url: &str) -> DriverResult<String> {
        self.navigate(url).await?;
        let value = self
            .execute("return document.body.innerText;", json!([]))
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Script("page text is not a string".to_string()))
    }

    async fn set_cookies(&self, cookies: &[CookieRecord]) -> DriverResult<()> {
        for cookie in cookies {
            self.post("/cookie", json!({ "cookie": cookie })).await?;
        }
        Ok(())
    }

    async fn cookies(&self) -> DriverResult<Vec<CookieRecord>> {
        let value = self.get("/cookie").await?;
        let cookies = serde_json::from_value(value)
            .map_err(|e| DriverError::Protocol(format!("malformed cookie payload: {}", e)))?;
        Ok(cookies)
    }

    async fn close(&self) -> DriverResult<()> {
        let response = self
            .client
            .delete(self.session_url(""))
            .send()
            .await?;
        Self::decode(response).await?;
        Ok(())
    }
}

/// Opens `WebDriverSession`s against a WebDriver server
pub struct WebDriverFactory {
    client: reqwest::Client,
    base: String,
}

impl WebDriverFactory {
    /// Creates a factory for the WebDriver server at `webdriver_url`
    pub fn new(webdriver_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: webdriver_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SessionFactory for WebDriverFactory {
    async fn open_session(&self, headless: bool) -> DriverResult<Arc<dyn SessionDriver>> {
        let mut args = vec!["--disable-gpu".to_string(), "--no-first-run".to_string()];
        if headless {
            args.push("--headless=new".to_string());
        }

        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        });

        let response = self
            .client
            .post(format!("{}/session", self.base))
            .json(&capabilities)
            .send()
            .await?;
        let value = WebDriverSession::decode(response).await?;

        let session_id = value["sessionId"]
            .as_str()
            .ok_or_else(|| DriverError::Protocol("missing sessionId".to_string()))?
            .to_string();

        tracing::debug!("Opened WebDriver session {} (headless={})", session_id, headless);

        Ok(Arc::new(WebDriverSession {
            client: self.client.clone(),
            base: self.base.clone(),
            session_id,
            fields: Mutex::new(HashMap::new()),
        }))
    }
}
