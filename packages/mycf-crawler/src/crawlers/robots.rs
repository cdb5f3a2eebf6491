//! robots.txt parsing and the per-host gate the scheduler consults.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::crawlers::throttle::{AutoThrottle, Outcome};
use crate::error::{TransportError, TransportResult};
use crate::traits::transport::Transport;
use crate::types::request::{Method, Request, RequestContext};

/// Parsed robots.txt rules.
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    /// Rules per user-agent token (lowercase)
    rules: HashMap<String, AgentRules>,

    /// Rules for `*`
    default_rules: AgentRules,
}

/// Rules for one group of user-agents.
#[derive(Debug, Clone, Default)]
pub struct AgentRules {
    /// Disallowed path prefixes
    disallow: Vec<String>,

    /// Allowed path prefixes (override disallow)
    allow: Vec<String>,
}

impl RobotsTxt {
    /// Parse robots.txt content.
    pub fn parse(content: &str) -> Self {
        let mut robots = Self::default();
        let mut agents: Vec<String> = Vec::new();
        let mut rules = AgentRules::default();
        let mut in_rules = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match directive.trim().to_lowercase().as_str() {
                "user-agent" => {
                    // A user-agent after rules starts a new group.
                    if in_rules {
                        robots.store(&agents, &rules);
                        agents.clear();
                        rules = AgentRules::default();
                        in_rules = false;
                    }
                    agents.push(value.to_lowercase());
                }
                "disallow" => {
                    in_rules = true;
                    if !value.is_empty() {
                        rules.disallow.push(value.to_string());
                    }
                }
                "allow" => {
                    in_rules = true;
                    if !value.is_empty() {
                        rules.allow.push(value.to_string());
                    }
                }
                _ => {}
            }
        }
        robots.store(&agents, &rules);

        robots
    }

    fn store(&mut self, agents: &[String], rules: &AgentRules) {
        for agent in agents {
            if agent == "*" {
                self.default_rules = rules.clone();
            } else {
                self.rules.insert(agent.clone(), rules.clone());
            }
        }
    }

    /// Check if a path is allowed for a user-agent.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let agent = user_agent.to_lowercase();

        let rules = self
            .rules
            .get(&agent)
            .or_else(|| {
                self.rules
                    .iter()
                    .find(|(token, _)| agent.contains(token.as_str()))
                    .map(|(_, rules)| rules)
            })
            .unwrap_or(&self.default_rules);

        if rules.allow.iter().any(|allow| path.starts_with(allow)) {
            return true;
        }

        !rules
            .disallow
            .iter()
            .any(|disallow| path.starts_with(disallow))
    }

    /// Check if robots.txt disallows all crawling.
    pub fn disallows_all(&self, user_agent: &str) -> bool {
        !self.is_allowed(user_agent, "/")
    }
}

/// Fetches robots.txt once per origin and answers whether a request may go out.
///
/// The robots.txt fetch itself waits for the shared throttle like any other
/// request. A robots.txt that cannot be fetched, or answers non-2xx, allows
/// everything.
pub struct RobotsGate {
    user_agent: String,
    cache: Mutex<HashMap<String, Arc<RobotsTxt>>>,
}

impl RobotsGate {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// `Ok(())` if the request may be issued.
    pub async fn check<T: Transport + ?Sized>(
        &self,
        transport: &T,
        throttle: &AutoThrottle,
        request: &Request,
    ) -> TransportResult<()> {
        let url = Url::parse(&request.url).map_err(|_| TransportError::InvalidUrl {
            url: request.url.clone(),
        })?;
        let origin = url.origin().ascii_serialization();

        let robots = {
            // Held across the fetch so each origin is fetched once.
            let mut cache = self.cache.lock().await;
            match cache.get(&origin) {
                Some(robots) => robots.clone(),
                None => {
                    let robots = Arc::new(self.fetch(transport, throttle, &origin).await);
                    cache.insert(origin.clone(), robots.clone());
                    robots
                }
            }
        };

        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        if robots.is_allowed(&self.user_agent, &path) {
            Ok(())
        } else {
            debug!(url = %request.url, "Disallowed by robots.txt");
            Err(TransportError::RobotsDisallowed {
                url: request.url.clone(),
            })
        }
    }

    async fn fetch<T: Transport + ?Sized>(
        &self,
        transport: &T,
        throttle: &AutoThrottle,
        origin: &str,
    ) -> RobotsTxt {
        let url = format!("{origin}/robots.txt");
        let request = Request {
            url: url.clone(),
            method: Method::Get,
            headers: BTreeMap::new(),
            body: None,
            page_param: 0,
            always_issue: false,
            context: RequestContext {
                keyword: String::new(),
                page_index: 0,
                referer: origin.to_string(),
            },
        };

        let Some(permit) = throttle.acquire().await else {
            return RobotsTxt::default();
        };
        let result = transport.fetch(&request).await;
        throttle.record(permit, Outcome::of(&result)).await;

        match result {
            Ok(response) if response.is_success() => {
                debug!(url = %url, "Loaded robots.txt");
                let robots = RobotsTxt::parse(&response.body);
                if robots.disallows_all(&self.user_agent) {
                    warn!(url = %url, user_agent = %self.user_agent, "robots.txt disallows all crawling");
                }
                robots
            }
            Ok(response) => {
                info!(url = %url, status = response.status, "No usable robots.txt, allowing all");
                RobotsTxt::default()
            }
            Err(e) => {
                info!(url = %url, error = %e, "robots.txt unavailable, allowing all");
                RobotsTxt::default()
            }
        }
    }
}
