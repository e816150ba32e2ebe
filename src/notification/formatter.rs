//! 消息格式化 - 将事件渲染为目标相关的通知消息
//!
//! 流程：
//! 1. 无服务 ID 的事件直接返回空消息
//! 2. 按事件类型提取提交、错误和变更镜像
//! 3. 渲染标题与正文模板，注入目标相关的 `format_link` 和 `truncate`
//! 4. 去除首尾空白、逐行 trim，并用目标的换行符拼接
//! 5. 标题或正文为空时返回空消息
//!
//! 模板在构造时解析一次，格式错误或调用未知函数都在启动阶段报错。

use tracing::warn;

use super::destination::MarkupStyle;
use super::message::Message;
use super::template::{Context, RenderError, Template, Value};
use crate::config::{ConfigError, FormatterSettings};
use crate::event::{Commit, Event, ResourceError};

/// 默认标题
pub const DEFAULT_TITLE_TEMPLATE: &str = "Applied flux changes to cluster";

/// 默认提交链接
pub const DEFAULT_COMMIT_TEMPLATE: &str = "{{ vcs_link }}/commit/{{ revision }}";

/// 默认正文
pub const DEFAULT_BODY_TEMPLATE: &str = r#"
Event: {{ event_string }}
{% if event_type != "commit" and commits %}Commits:
{% for commit in commits %}
* {{ format_link(commit.link, truncate(commit.revision)) }}: {{ commit.message }}
{% endfor %}{% endif %}
{% if event_service_ids %}Resources updated:
{% for id in event_service_ids %}
* {{ id }}
{% endfor %}{% endif %}
{% if errors %}Errors:
{% for error in errors %}
Resource {{ error.id }}, file: {{ error.path }}:

> {{ error.error }}
{% endfor %}{% endif %}
"#;

/// 标题、正文模板可用的函数
const MESSAGE_FUNCTIONS: &[&str] = &["format_link", "truncate"];

/// 提交链接模板可用的函数
const COMMIT_FUNCTIONS: &[&str] = &["truncate"];

/// `truncate` 默认保留的字符数
pub const DEFAULT_TRUNCATE_LENGTH: usize = 7;

/// 事件格式化器，构造后只读，可在请求间共享
#[derive(Debug, Clone)]
pub struct Formatter {
    vcs_link: String,
    title: Template,
    body: Template,
    commit_link: Template,
}

impl Formatter {
    pub fn new(settings: &FormatterSettings) -> Result<Self, ConfigError> {
        let template = |name: &'static str, custom: &Option<String>, default: &str, functions: &[&str]| {
            let source = custom.as_deref().unwrap_or(default);
            Template::parse(source)
                .and_then(|t| t.check_functions(functions).map(|_| t))
                .map_err(|source| ConfigError::InvalidTemplate { name, source })
        };

        Ok(Self {
            vcs_link: settings.vcs_link.clone(),
            title: template("title", &settings.title_template, DEFAULT_TITLE_TEMPLATE, MESSAGE_FUNCTIONS)?,
            body: template("body", &settings.body_template, DEFAULT_BODY_TEMPLATE, MESSAGE_FUNCTIONS)?,
            commit_link: template(
                "commit",
                &settings.commit_template,
                DEFAULT_COMMIT_TEMPLATE,
                COMMIT_FUNCTIONS,
            )?,
        })
    }

    pub fn vcs_link(&self) -> &str {
        &self.vcs_link
    }

    /// 为某个目标渲染事件
    pub fn format_event<M: MarkupStyle + ?Sized>(&self, event: &Event, style: &M) -> Message {
        if event.service_ids.is_empty() {
            return Message::empty();
        }

        let commits = event.metadata.commits();
        let commit_links: Vec<String> = commits.iter().map(|c| self.commit_link(&c.revision)).collect();

        let ctx = self.context(event, &commits, &commit_links, &event.metadata.errors(), style);
        let new_line = style.new_line();
        let title = render_field("title", &self.title, &ctx, new_line);
        let body = render_field("body", &self.body, &ctx, new_line);

        if title.is_empty() || body.is_empty() {
            return Message::empty();
        }

        let title_link = commit_links
            .into_iter()
            .next()
            .unwrap_or_else(|| self.vcs_link.clone());

        Message {
            title_link,
            title,
            body,
            event_type: Some(event.event_type.clone()),
            event: Some(event.clone()),
        }
    }

    /// 某个 revision 的提交链接
    pub fn commit_link(&self, revision: &str) -> String {
        let mut ctx = Context::new()
            .with("vcs_link", self.vcs_link.as_str())
            .with("revision", revision);
        ctx.function("truncate", truncate);

        match self.commit_link.render(&ctx) {
            Ok(link) => link.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "Commit link template failed, falling back to VCS link");
                self.vcs_link.clone()
            }
        }
    }

    fn context<'a, M: MarkupStyle + ?Sized>(
        &self,
        event: &Event,
        commits: &[Commit],
        commit_links: &[String],
        errors: &[ResourceError],
        style: &'a M,
    ) -> Context<'a> {
        let commits: Vec<Value> = commits
            .iter()
            .zip(commit_links)
            .map(|(commit, link)| {
                Value::map([
                    ("revision", commit.revision.as_str()),
                    ("message", commit.message.as_str()),
                    ("link", link.as_str()),
                ])
            })
            .collect();

        let errors: Vec<Value> = errors
            .iter()
            .map(|e| {
                Value::map([
                    ("id", e.id.as_str()),
                    ("path", e.path.as_str()),
                    ("error", e.error.as_str()),
                ])
            })
            .collect();

        let mut ctx = Context::new()
            .with("vcs_link", self.vcs_link.as_str())
            .with("event_id", event.id)
            .with("event_service_ids", event.service_id_strings())
            .with("event_type", event.event_type.as_str())
            .with("event_started_at", event.started_at.to_rfc3339())
            .with("event_ended_at", event.ended_at.to_rfc3339())
            .with("event_log_level", event.log_level.as_str())
            .with("event_message", event.message.as_str())
            .with("event_string", event.summary())
            .with("commits", commits)
            .with("errors", errors)
            .with("changed_images", event.metadata.changed_images());

        ctx.function("format_link", move |args: &[Value]| match args {
            [url, label] => Ok(Value::Str(style.format_link(&url.to_string(), &label.to_string()))),
            _ => Err(RenderError::bad_arguments("format_link", "expected (url, label)")),
        });
        ctx.function("truncate", truncate);

        ctx
    }
}

/// 截取前 n 个字符（默认 7）
fn truncate(args: &[Value]) -> Result<Value, RenderError> {
    let (text, length) = match args {
        [text] => (text, DEFAULT_TRUNCATE_LENGTH),
        [text, Value::Int(n)] if *n >= 0 => (text, usize::try_from(*n).unwrap_or(usize::MAX)),
        _ => return Err(RenderError::bad_arguments("truncate", "expected (text[, length])")),
    };
    Ok(Value::Str(text.to_string().chars().take(length).collect()))
}

fn render_field(name: &str, template: &Template, ctx: &Context<'_>, new_line: &str) -> String {
    match template.render(ctx) {
        Ok(text) => tidy(&text, new_line),
        Err(e) => {
            warn!(field = name, error = %e, "Template render failed");
            String::new()
        }
    }
}

/// 去除首尾空白，逐行 trim 后按目标换行符拼接
fn tidy(text: &str, new_line: &str) -> String {
    text.trim()
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(new_line)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYNC: &str = include_str!("../../tests/fixtures/sync.json");
    const SYNC_ERRORS: &str = include_str!("../../tests/fixtures/sync_errors.json");
    const COMMIT: &str = include_str!("../../tests/fixtures/commit.json");
    const AUTORELEASE: &str = include_str!("../../tests/fixtures/autorelease.json");
    const UPDATE_POLICY: &str = include_str!("../../tests/fixtures/update_policy.json");
    const EMPTY: &str = include_str!("../../tests/fixtures/empty.json");

    /// 默认标记风格（与 Slack 相同）
    struct Chat;

    impl MarkupStyle for Chat {}

    /// HTML 风格
    struct Html;

    impl MarkupStyle for Html {
        fn new_line(&self) -> &str {
            "<br>"
        }

        fn format_link(&self, url: &str, label: &str) -> String {
            format!("<a href='{}'>{}</a>", url, label)
        }
    }

    fn formatter(vcs_link: &str) -> Formatter {
        Formatter::new(&FormatterSettings::new(vcs_link)).unwrap()
    }

    fn event(json: &str) -> Event {
        Event::from_json(json).unwrap()
    }

    #[test]
    fn test_format_sync_event() {
        let event = event(SYNC);
        let message = formatter("https://github.com").format_event(&event, &Chat);

        assert_eq!(
            message.title_link,
            "https://github.com/commit/810c2e6f22ac5ab7c831fe0dd697fe32997b098f"
        );
        assert_eq!(message.title, "Applied flux changes to cluster");
        assert_eq!(message.event_type, Some(event.event_type.clone()));
        assert_eq!(
            message.body,
            "Event: Sync: 810c2e6, default:deployment/test\n\
             Commits:\n\
             \n\
             * <https://github.com/commit/810c2e6f22ac5ab7c831fe0dd697fe32997b098f|810c2e6>: change test image\n\
             \n\
             Resources updated:\n\
             \n\
             * default:deployment/test"
        );
        assert_eq!(message.event, Some(event));
    }

    #[test]
    fn test_format_commit_event_skips_commit_list() {
        let message = formatter("https://github.com").format_event(&event(COMMIT), &Chat);

        assert_eq!(
            message.title_link,
            "https://github.com/commit/d644e1a05db6881abf0cdb78299917b95f442036"
        );
        assert_eq!(
            message.body,
            "Event: Commit: d644e1a, default:deployment/test\n\nResources updated:\n\n* default:deployment/test"
        );
    }

    #[test]
    fn test_format_autorelease_links_to_vcs() {
        let message = formatter("https://github.com").format_event(&event(AUTORELEASE), &Chat);

        assert_eq!(message.title_link, "https://github.com");
        assert_eq!(
            message.body,
            "Event: Automated release of justinbarrick/nginx:test3\n\nResources updated:\n\n* default:deployment/test"
        );
    }

    #[test]
    fn test_format_update_policy_sync() {
        let message = formatter("https://github.com").format_event(&event(UPDATE_POLICY), &Chat);

        assert_eq!(
            message.body,
            "Event: Sync: d644e1a, default:deployment/test\n\
             Commits:\n\
             \n\
             * <https://github.com/commit/d644e1a05db6881abf0cdb78299917b95f442036|d644e1a>: Automated: default:deployment/test\n\
             \n\
             Resources updated:\n\
             \n\
             * default:deployment/test"
        );
    }

    #[test]
    fn test_format_sync_errors() {
        let message = formatter("https://github.com").format_event(&event(SYNC_ERRORS), &Chat);

        assert!(message.body.contains(
            "Errors:\n\nResource default:persistentvolumeclaim/test, file: manifests/test.yaml:\n\n\
             > running kubectl: The PersistentVolumeClaim \"test\" is invalid"
        ));
        assert!(message
            .body
            .contains("Resource default:persistentvolumeclaim/lol, file: manifests/lol.yaml:"));
    }

    #[test]
    fn test_empty_service_ids_yield_empty_message() {
        let message = formatter("https://github.com").format_event(&event(EMPTY), &Chat);
        assert_eq!(message, Message::empty());
        assert!(message.is_empty());
    }

    #[test]
    fn test_destination_markup_is_used() {
        let message = formatter("https://example.com").format_event(&event(SYNC), &Html);

        assert!(message.body.starts_with("Event: Sync: 810c2e6, default:deployment/test<br>Commits:<br>"));
        assert!(message.body.contains(
            "* <a href='https://example.com/commit/810c2e6f22ac5ab7c831fe0dd697fe32997b098f'>810c2e6</a>: change test image"
        ));
        assert!(!message.body.contains('\n'));
    }

    #[test]
    fn test_formatting_is_idempotent() {
        let formatter = formatter("https://github.com");
        let event = event(SYNC_ERRORS);
        assert_eq!(formatter.format_event(&event, &Chat), formatter.format_event(&event, &Chat));
    }

    #[test]
    fn test_revision_truncation() {
        assert_eq!(truncate(&[Value::from("1234567890")]).unwrap(), Value::from("1234567"));
        assert_eq!(truncate(&[Value::from("1234567")]).unwrap(), Value::from("1234567"));
        assert_eq!(truncate(&[Value::from("abc")]).unwrap(), Value::from("abc"));
        assert_eq!(truncate(&[Value::from("abcdef"), Value::Int(2)]).unwrap(), Value::from("ab"));
        assert!(truncate(&[]).is_err());
    }

    #[test]
    fn test_short_revision_in_rendered_label() {
        let mut event = event(SYNC);
        event.metadata = crate::event::EventMetadata::Sync(crate::event::SyncMetadata {
            commits: vec![Commit {
                revision: "abc".to_string(),
                message: "short".to_string(),
            }],
            ..Default::default()
        });
        let message = formatter("https://github.com").format_event(&event, &Chat);
        assert!(message.body.contains("* <https://github.com/commit/abc|abc>: short"));
    }

    #[test]
    fn test_custom_templates() {
        let mut settings = FormatterSettings::new("https://gitlab.com/org/repo");
        settings.title_template = Some("{{ event_type }} on {{ len(event_service_ids) }} resource(s)".to_string());
        settings.body_template = Some(
            "{% for id in event_service_ids %}{{ id }}{% if not loop.last %}, {% endif %}{% endfor %}".to_string(),
        );
        settings.commit_template = Some("{{ vcs_link }}/-/commit/{{ truncate(revision, 10) }}".to_string());
        let formatter = Formatter::new(&settings).unwrap();

        let message = formatter.format_event(&event(SYNC), &Chat);
        assert_eq!(message.title, "sync on 1 resource(s)");
        assert_eq!(message.body, "default:deployment/test");
        assert_eq!(message.title_link, "https://gitlab.com/org/repo/-/commit/810c2e6f22");
    }

    #[test]
    fn test_blank_render_yields_empty_message() {
        let mut settings = FormatterSettings::new("https://github.com");
        settings.body_template = Some("{% if errors %}{{ errors }}{% endif %}   ".to_string());
        let formatter = Formatter::new(&settings).unwrap();

        assert!(formatter.format_event(&event(SYNC), &Chat).is_empty());
    }

    #[test]
    fn test_invalid_templates_fail_construction() {
        let mut settings = FormatterSettings::new("https://github.com");
        settings.title_template = Some("{% if %}".to_string());
        assert!(matches!(
            Formatter::new(&settings),
            Err(ConfigError::InvalidTemplate { name: "title", .. })
        ));

        let mut settings = FormatterSettings::new("https://github.com");
        settings.body_template = Some("{{ shout(event_string) }}".to_string());
        assert!(matches!(
            Formatter::new(&settings),
            Err(ConfigError::InvalidTemplate { name: "body", .. })
        ));

        let mut settings = FormatterSettings::new("https://github.com");
        settings.commit_template = Some("{{ format_link(vcs_link, revision) }}".to_string());
        assert!(matches!(
            Formatter::new(&settings),
            Err(ConfigError::InvalidTemplate { name: "commit", .. })
        ));
    }
}
