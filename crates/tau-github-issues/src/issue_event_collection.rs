use serde::{Deserialize, Serialize};
use serde_json::Value;
use tau_forum_sync::{IssueState, TrackerComment, TrackerIssue};

#[derive(Debug, Clone, Deserialize, Serialize)]
/// Public struct `GithubUser` used across bridge components.
pub struct GithubUser {
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
/// Public struct `GithubIssueLabel` used across bridge components.
pub struct GithubIssueLabel {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
/// Issue as returned by the REST API and embedded in webhook payloads.
pub struct GithubIssue {
    pub number: u64,
    pub node_id: String,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default = "default_issue_state")]
    pub state: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub html_url: String,
    pub user: GithubUser,
    #[serde(default)]
    pub labels: Vec<GithubIssueLabel>,
    #[serde(default)]
    pub pull_request: Option<Value>,
}

fn default_issue_state() -> String {
    "open".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
/// Public struct `GithubIssueComment` used across bridge components.
pub struct GithubIssueComment {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: String,
    pub user: GithubUser,
}

#[derive(Debug, Clone, Deserialize)]
/// Response body of `POST /repos/{owner}/{repo}/issues`.
pub struct GithubIssueCreateResponse {
    pub number: u64,
    pub node_id: String,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
/// Response body of `POST /repos/{owner}/{repo}/issues/{number}/comments`.
pub struct GithubCommentCreateResponse {
    pub id: u64,
    #[serde(default)]
    pub html_url: Option<String>,
}

pub fn parse_issue_state(raw: &str) -> IssueState {
    if raw.trim().eq_ignore_ascii_case("closed") {
        IssueState::Closed
    } else {
        IssueState::Open
    }
}

impl GithubIssue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    pub fn to_tracker_issue(&self) -> TrackerIssue {
        TrackerIssue {
            number: self.number,
            node_id: self.node_id.clone(),
            title: self.title.clone(),
            body: self.body.clone(),
            state: parse_issue_state(&self.state),
            locked: self.locked,
            labels: self.labels.iter().map(|label| label.name.clone()).collect(),
            html_url: self.html_url.clone(),
            author_login: self.user.login.clone(),
        }
    }
}

impl GithubIssueComment {
    pub fn to_tracker_comment(&self) -> TrackerComment {
        TrackerComment {
            id: self.id,
            body: self.body.clone(),
            html_url: self.html_url.clone(),
            author_login: self.user.login.clone(),
        }
    }
}
