use crate::error::{HarvestError, Result};
use crate::page::{HostPage, NodePath};
use async_trait::async_trait;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Serializes a copy of the document with live form state and computed
/// visibility written into attributes. The live DOM is never modified.
const SNAPSHOT_SCRIPT: &str = r#"(() => {
  const root = document.documentElement;
  const live = [root, ...root.querySelectorAll('*')];
  const copy = root.cloneNode(true);
  const mirror = [copy, ...copy.querySelectorAll('*')];
  for (let i = 0; i < live.length && i < mirror.length; i++) {
    const el = live[i];
    const out = mirror[i];
    const tag = el.tagName;
    if (tag === 'INPUT') {
      if (el.type === 'checkbox' || el.type === 'radio') {
        if (el.checked) out.setAttribute('checked', ''); else out.removeAttribute('checked');
      } else {
        out.setAttribute('value', el.value == null ? '' : el.value);
      }
    } else if (tag === 'TEXTAREA') {
      out.textContent = el.value == null ? '' : el.value;
    } else if (tag === 'OPTION') {
      if (el.selected) out.setAttribute('selected', ''); else out.removeAttribute('selected');
    }
    if (tag === 'HEAD' || tag === 'SCRIPT' || tag === 'STYLE') continue;
    const style = window.getComputedStyle(el);
    if (style.display === 'none' || style.visibility === 'hidden') {
      out.setAttribute('data-harvest-hidden', '1');
      continue;
    }
    if (style.position === 'fixed' || style.position === 'absolute' || style.zIndex !== 'auto') {
      const rect = el.getBoundingClientRect();
      out.setAttribute('data-harvest-pos', style.position);
      if (style.zIndex !== 'auto') out.setAttribute('data-harvest-z', style.zIndex);
      out.setAttribute('data-harvest-w', String(Math.round(rect.width)));
      out.setAttribute('data-harvest-h', String(Math.round(rect.height)));
    }
  }
  return copy.outerHTML;
})()"#;

const ESCAPE_SCRIPT: &str = r#"(() => {
  const init = { key: 'Escape', code: 'Escape', keyCode: 27, which: 27, bubbles: true };
  const target = document.activeElement || document.body;
  target.dispatchEvent(new KeyboardEvent('keydown', init));
  target.dispatchEvent(new KeyboardEvent('keyup', init));
  if (target !== document.body) {
    document.dispatchEvent(new KeyboardEvent('keydown', init));
  }
  return true;
})()"#;

fn click_script(css: &str) -> Result<String> {
    let literal = serde_json::to_string(css).map_err(|e| HarvestError::Page {
        message: format!("Cannot encode selector: {}", e),
    })?;
    Ok(format!(
        r#"(() => {{
  const el = document.querySelector({literal});
  if (!el) return false;
  if (el.scrollIntoView) el.scrollIntoView({{ block: 'center' }});
  el.click();
  return true;
}})()"#
    ))
}

/// A tab of an already running, already authenticated Chrome, driven over
/// the DevTools protocol.
pub struct ChromiumPage {
    _browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    endpoint: String,
}

impl ChromiumPage {
    /// Attaches to the browser behind `endpoint` and picks the first tab whose
    /// URL contains `tab_hint`, or the first tab at all.
    pub async fn connect(endpoint: &str, tab_hint: Option<&str>) -> Result<Self> {
        let browser_error = |e: chromiumoxide::error::CdpError| HarvestError::Browser {
            message: format!("{}: {}", endpoint, e),
        };

        let (mut browser, mut handler) = Browser::connect(endpoint.to_string())
            .await
            .map_err(browser_error)?;

        let handler = tokio::spawn(async move {
            while handler.next().await.is_some() {}
        });

        browser.fetch_targets().await.map_err(browser_error)?;
        // Existing tabs attach asynchronously after the target fetch.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let mut chosen = None;
        let mut fallback = None;
        for page in browser.pages().await.map_err(browser_error)? {
            let url = page.url().await.ok().flatten().unwrap_or_default();
            if tab_hint.is_some_and(|hint| url.contains(hint)) {
                chosen = Some(page);
                break;
            }
            if fallback.is_none() {
                fallback = Some(page);
            }
        }

        let page = chosen.or(fallback).ok_or_else(|| HarvestError::Browser {
            message: format!("{}: no open tabs to attach to", endpoint),
        })?;

        Ok(Self {
            _browser: browser,
            page,
            handler,
            endpoint: endpoint.to_string(),
        })
    }
}

async fn evaluate<T: DeserializeOwned>(page: &Page, script: &str) -> Result<T> {
    let result = page.evaluate(script).await.map_err(|e| HarvestError::Page {
        message: format!("Script execution failed: {}", e),
    })?;

    result.into_value().map_err(|e| HarvestError::Page {
        message: format!("Unexpected script result: {:?}", e),
    })
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl HostPage for ChromiumPage {
    async fn snapshot(&mut self) -> Result<String> {
        evaluate::<String>(&self.page, SNAPSHOT_SCRIPT).await
    }

    async fn click(&mut self, target: &NodePath) -> Result<()> {
        let script = click_script(&target.to_css())?;
        let clicked: bool = evaluate(&self.page, &script).await?;
        if clicked {
            Ok(())
        } else {
            Err(HarvestError::ElementNotFound {
                path: target.to_css(),
            })
        }
    }

    async fn press_escape(&mut self) -> Result<()> {
        evaluate::<bool>(&self.page, ESCAPE_SCRIPT).await.map(|_| ())
    }

    fn describe(&self) -> String {
        format!("browser tab via {}", self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_script_embeds_selector_as_literal() {
        let script = click_script("html > :nth-child(2) > :nth-child(1)").unwrap();
        assert!(script.contains(r#"document.querySelector("html > :nth-child(2) > :nth-child(1)")"#));
        assert!(script.contains("el.click()"));
    }

    #[test]
    fn test_scripts_are_expressions() {
        for script in [SNAPSHOT_SCRIPT, ESCAPE_SCRIPT] {
            assert!(script.starts_with("(() => {"));
            assert!(script.ends_with("})()"));
        }
    }
}
