//! agent-browser driver tests
//!
//! These talk to a real browser and are ignored by default.

use std::time::Duration;
use tokio::time::timeout;

use webpilot::agent::Action;
use webpilot::browser::{AgentBrowserDriver, BrowserDriver};
use webpilot::core::Config;

async fn driver() -> Option<AgentBrowserDriver> {
    if !AgentBrowserDriver::is_available().await {
        eprintln!("Skipping test: agent-browser not available");
        return None;
    }
    let mut config = Config::default();
    config.browser.session_name = "webpilot-test".to_string();
    Some(AgentBrowserDriver::from_config(&config.browser))
}

#[tokio::test]
#[ignore] // Requires agent-browser to be installed
async fn test_open_and_snapshot() {
    let Some(driver) = driver().await else { return };

    let result = timeout(Duration::from_secs(60), async {
        driver.open("https://example.com").await?;
        driver.snapshot().await
    })
    .await;

    let snapshot = result.expect("timed out").expect("snapshot failed");
    assert!(snapshot.has_screenshot());
    assert!(!snapshot.page_text().is_empty());
    driver.close().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_scroll_window() {
    let Some(driver) = driver().await else { return };

    driver.open("https://example.com").await.unwrap();
    let snapshot = driver.snapshot().await.unwrap();
    let action = Action::Scroll {
        target: webpilot::agent::ScrollTarget::Window,
        direction: webpilot::agent::ScrollDirection::Down,
    };
    let outcome = driver.execute(&action, &snapshot).await.unwrap();
    assert!(outcome.downloaded_pdf.is_none());
    driver.close().await.unwrap();
}
