use std::fs;
use std::path::{Path, PathBuf};

use http::Uri;
use serde::Deserialize;

use crate::markdown::converter::{TocOptions, TocPosition};
use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
struct ConsyncYaml {
    space: SpaceYaml,
    #[serde(default)]
    content: ContentYaml,
    #[serde(default)]
    sync: SyncYaml,
    #[serde(default)]
    files: FilesYaml,
    confluence: ConfluenceYaml,
}

impl ConsyncYaml {
    fn find(root: &Path) -> Option<PathBuf> {
        if root.join("consync.yaml").exists() {
            Some(root.join("consync.yaml"))
        } else if root.join("consync.yml").exists() {
            Some(root.join("consync.yml"))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpaceYaml {
    key: String,
    root_page_id: Option<String>,
    root_page_title: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ContentYaml {
    dir: Option<String>,
    title_source: Option<TitleSource>,
    #[serde(default)]
    toc: TocYaml,
    #[serde(default)]
    frontmatter: FrontmatterYaml,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct TocYaml {
    enabled: Option<bool>,
    depth: Option<u32>,
    position: Option<TocPosition>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct FrontmatterYaml {
    strip: Option<bool>,
    use_title: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SyncYaml {
    delete_orphans: Option<bool>,
    update_unchanged: Option<bool>,
    state_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct FilesYaml {
    index_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfluenceYaml {
    url: String,
    username: Option<String>,
    api_token: Option<String>,
    personal_access_token: Option<String>,
    timeout: Option<u64>,
    retry_count: Option<u32>,
}

/// How a page gets its title when frontmatter and headings disagree.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleSource {
    Filename,
    Frontmatter,
    FirstHeading,
}

/// Exactly one authentication scheme is configured per run.
#[derive(Debug, Clone, PartialEq)]
pub enum Credentials {
    Basic { username: String, api_token: String },
    Bearer(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    project_root: PathBuf,
    yaml: ConsyncYaml,
}

impl Config {
    pub fn load(project_root: &Path) -> Result<Config> {
        let path = ConsyncYaml::find(project_root).ok_or_else(|| {
            Error::Config(format!(
                "Could not find consync.yaml in {}",
                project_root.display()
            ))
        })?;

        let raw = fs::read_to_string(&path)?;
        Config::from_yaml_str(project_root, &raw)
    }

    pub fn from_yaml_str(project_root: &Path, yaml: &str) -> Result<Config> {
        let yaml: ConsyncYaml = serde_yaml::from_str(yaml)?;
        let config = Config {
            project_root: project_root.to_path_buf(),
            yaml,
        };
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.yaml.space.key.trim().is_empty() {
            return Err(Error::Config("space.key must not be empty".into()));
        }

        Uri::try_from(self.yaml.confluence.url.as_str()).map_err(|err| {
            Error::Config(format!(
                "Invalid confluence.url `{}`: {}",
                self.yaml.confluence.url, err
            ))
        })?;

        if !self.yaml.confluence.url.starts_with("http://")
            && !self.yaml.confluence.url.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "confluence.url must be an absolute http(s) URL. Got `{}`.",
                self.yaml.confluence.url
            )));
        }

        Ok(())
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn content_dir(&self) -> PathBuf {
        let dir = self.yaml.content.dir.as_deref().unwrap_or("docs");
        self.project_root.join(dir)
    }

    pub fn space_key(&self) -> &str {
        &self.yaml.space.key
    }

    pub fn root_page_id(&self) -> Option<&str> {
        self.yaml.space.root_page_id.as_deref()
    }

    pub fn root_page_title(&self) -> Option<&str> {
        self.yaml.space.root_page_title.as_deref()
    }

    pub fn title_source(&self) -> TitleSource {
        self.yaml
            .content
            .title_source
            .unwrap_or(TitleSource::Frontmatter)
    }

    pub fn toc(&self) -> TocOptions {
        let toc = &self.yaml.content.toc;
        let enabled = toc.enabled.unwrap_or(false);

        let position = if !enabled {
            TocPosition::None
        } else {
            toc.position.unwrap_or(TocPosition::Top)
        };

        TocOptions {
            position,
            max_level: toc.depth.unwrap_or(3),
        }
    }

    pub fn strip_frontmatter(&self) -> bool {
        self.yaml.content.frontmatter.strip.unwrap_or(true)
    }

    pub fn use_frontmatter_title(&self) -> bool {
        self.yaml.content.frontmatter.use_title.unwrap_or(true)
    }

    pub fn delete_orphans(&self) -> bool {
        self.yaml.sync.delete_orphans.unwrap_or(false)
    }

    pub fn update_unchanged(&self) -> bool {
        self.yaml.sync.update_unchanged.unwrap_or(false)
    }

    pub fn state_file(&self) -> PathBuf {
        match &self.yaml.sync.state_file {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.project_root.join(path),
            None => self.content_dir().join(".consync").join("state.json"),
        }
    }

    pub fn index_file(&self) -> &str {
        self.yaml.files.index_file.as_deref().unwrap_or("index.md")
    }

    pub fn confluence_url(&self) -> &str {
        &self.yaml.confluence.url
    }

    pub fn timeout_secs(&self) -> u64 {
        self.yaml.confluence.timeout.unwrap_or(30)
    }

    pub fn retry_count(&self) -> u32 {
        self.yaml.confluence.retry_count.unwrap_or(3)
    }

    pub fn color_enabled(&self) -> bool {
        std::env::var_os("NO_COLOR").is_none()
    }

    /// Credentials come from the YAML or from the environment
    /// (`CONSYNC_USERNAME`/`CONSYNC_API_TOKEN`, or `CONSYNC_PAT`).
    pub fn credentials(&self) -> Result<Credentials> {
        let username = self
            .yaml
            .confluence
            .username
            .clone()
            .or_else(|| std::env::var("CONSYNC_USERNAME").ok());
        let api_token = self
            .yaml
            .confluence
            .api_token
            .clone()
            .or_else(|| std::env::var("CONSYNC_API_TOKEN").ok());
        let pat = self
            .yaml
            .confluence
            .personal_access_token
            .clone()
            .or_else(|| std::env::var("CONSYNC_PAT").ok());

        match (username, api_token, pat) {
            (Some(username), Some(api_token), None) => {
                Ok(Credentials::Basic {
                    username,
                    api_token,
                })
            }
            (None, None, Some(token)) => Ok(Credentials::Bearer(token)),
            (None, None, None) => Err(Error::Config(
                "No credentials configured. Set confluence.username and \
                 confluence.apiToken, or confluence.personalAccessToken."
                    .into(),
            )),
            (username, _, None) => {
                let missing = if username.is_none() {
                    "confluence.username"
                } else {
                    "confluence.apiToken"
                };
                Err(Error::Config(format!(
                    "Incomplete basic credentials: {} is missing.",
                    missing
                )))
            }
            _ => Err(Error::Config(
                "Configure either basic credentials or a personal access \
                 token, not both."
                    .into(),
            )),
        }
    }
}
