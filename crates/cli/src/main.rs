use clap::{Args, Parser, Subcommand};
use longform_adapters::{create_llm_adapter, AdapterError, LanguageModelError};
use longform_core::{
    Character, ConfigStore, JsonDocumentStore, LanguageModel, LogLevel, LogRecord, LogSink,
    NarrativeError, NovelSession, PromptError, PromptRegistry, SessionSettings, SharedLogSink,
    SnapshotError, StdoutLogSink, StoreError, StoryParams,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let sink: SharedLogSink = Arc::new(StdoutLogSink::new());
    let paths = Paths {
        config: cli.config,
        session: cli.session,
    };

    match cli.command {
        Command::Start(args) => run_start(&paths, args, sink),
        Command::Continue(args) => run_continue(&paths, args, sink),
        Command::Status(args) => run_status(&paths, args, sink),
        Command::Reset => run_reset(&paths, sink),
        Command::Export(args) => run_export(&paths, args, sink),
        Command::Character(CharacterCommand::Add(args)) => run_add_character(&paths, args, sink),
        Command::Config(ConfigCommand::TestLlm(args)) => {
            run_test_llm(&paths.config, args, sink.as_ref())
        }
    }
}

struct Paths {
    config: PathBuf,
    session: PathBuf,
}

/// Everything a writing command needs, loaded from the config and session files.
struct Workspace {
    store: ConfigStore,
    session: NovelSession,
    sink: SharedLogSink,
}

impl Workspace {
    fn open(paths: &Paths, sink: SharedLogSink) -> Result<Self, CliError> {
        let mut store = ConfigStore::open(paths.config.clone())?;
        store.ensure_recent_defaults();
        let settings = SessionSettings::from(&store.config().longform);
        let session =
            NovelSession::load_from_path(settings, &paths.session)?.with_sink(Arc::clone(&sink));
        Ok(Self {
            store,
            session,
            sink,
        })
    }

    fn prompts(&self) -> Result<PromptRegistry, CliError> {
        Ok(PromptRegistry::from_prompt_config(
            &self.store.config().prompts,
        )?)
    }

    fn model(
        &self,
        preferred: Option<String>,
    ) -> Result<(String, Box<dyn LanguageModel>), CliError> {
        let selected = select_llm_interface(&self.store, preferred)?;
        self.log(LogLevel::Info, format!("使用 LLM 接口：{selected}"));
        let adapter = create_llm_adapter(self.store.config(), &selected)?;
        Ok((selected, adapter))
    }

    /// Writes the session snapshot and the document after every committed unit.
    fn save_progress(&self, paths: &Paths) -> Result<(), CliError> {
        self.session.save_to_path(&paths.session)?;
        if self.session.is_active() {
            let longform = &self.store.config().longform;
            let documents = JsonDocumentStore::open(&longform.store_dir)?;
            let id = self.session.persist(&documents, &longform.engine_name)?;
            self.log(
                LogLevel::Info,
                format!("已保存到文档库：{id}（{}）", documents.path().display()),
            );
        }
        Ok(())
    }

    fn remember_interface(&mut self, selected: String) -> Result<(), CliError> {
        self.store.touch_llm_interface(selected);
        self.store.save()?;
        Ok(())
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.sink.log(LogRecord::new(level, message.into()));
    }
}

fn run_start(paths: &Paths, args: StartArgs, sink: SharedLogSink) -> Result<(), CliError> {
    let mut workspace = Workspace::open(paths, sink)?;
    if args.force && workspace.session.is_active() {
        workspace.session.reset();
    }

    let prompts = workspace.prompts()?;
    let (selected, model) = workspace.model(args.llm_interface)?;
    let params = StoryParams {
        title: args.title,
        genre: args.genre,
        main_character: args.protagonist,
        character_description: args.description,
        outline: args.outline,
        target_chapters: args
            .chapters
            .unwrap_or(workspace.store.config().longform.default_target_chapters),
        chapter_length: args.length,
        style: args.style,
    };

    let output = workspace
        .session
        .start(model.as_ref(), &prompts, params)?;
    workspace.save_progress(paths)?;
    println!("{output}");

    workspace.remember_interface(selected)
}

fn run_continue(paths: &Paths, args: ContinueArgs, sink: SharedLogSink) -> Result<(), CliError> {
    let mut workspace = Workspace::open(paths, sink)?;
    if !workspace.session.is_active() {
        return Err(NarrativeError::NotInitialized.into());
    }

    let prompts = workspace.prompts()?;
    let (selected, model) = workspace.model(args.llm_interface)?;

    for round in 0..args.count.max(1) {
        if round > 0 && workspace.session.next_unit().is_none() {
            workspace.log(LogLevel::Info, "尾声已完成，停止续写。");
            break;
        }
        let output = workspace
            .session
            .continue_writing(model.as_ref(), &prompts)?;
        workspace.save_progress(paths)?;
        println!("{output}");
    }

    workspace.remember_interface(selected)
}

fn run_status(paths: &Paths, args: StatusArgs, sink: SharedLogSink) -> Result<(), CliError> {
    let workspace = Workspace::open(paths, sink)?;
    if args.latest {
        println!("{}", workspace.session.latest_output()?);
        return Ok(());
    }

    let status = workspace.session.status()?;

    println!("标题：{}", status.title);
    println!("类型：{}", status.genre);
    println!("进度：{}", status.progress);
    println!("总字数：{}字", status.word_count);
    println!("已创作章节：{}", status.chapter_labels.join(", "));
    match workspace.session.next_unit() {
        Some(unit) => println!("下一单元：{unit}"),
        None => println!("下一单元：无（已完成尾声）"),
    }
    Ok(())
}

fn run_reset(paths: &Paths, sink: SharedLogSink) -> Result<(), CliError> {
    let mut workspace = Workspace::open(paths, sink)?;
    workspace.session.reset();
    workspace.session.save_to_path(&paths.session)?;
    workspace.log(LogLevel::Info, "创作状态已清空。");
    Ok(())
}

fn run_export(paths: &Paths, args: ExportArgs, sink: SharedLogSink) -> Result<(), CliError> {
    let workspace = Workspace::open(paths, sink)?;
    let document = workspace
        .session
        .document()
        .ok_or(NarrativeError::NotInitialized)?;

    match args.output {
        Some(path) => {
            fs::write(&path, document).map_err(|source| CliError::Io {
                path: path.clone(),
                source,
            })?;
            workspace.log(
                LogLevel::Info,
                format!("全文已导出：{}", path.display()),
            );
        }
        None => println!("{document}"),
    }
    Ok(())
}

fn run_add_character(
    paths: &Paths,
    args: CharacterAddArgs,
    sink: SharedLogSink,
) -> Result<(), CliError> {
    let mut workspace = Workspace::open(paths, sink)?;
    let name = args.name.clone();
    workspace.session.add_character(Character::new(
        args.name,
        args.description.unwrap_or_default(),
        args.role,
    ))?;
    workspace.session.save_to_path(&paths.session)?;
    workspace.log(LogLevel::Info, format!("已添加角色：{name}"));
    Ok(())
}

fn run_test_llm(config_path: &Path, args: TestLlmArgs, sink: &dyn LogSink) -> Result<(), CliError> {
    let mut store = ConfigStore::open(config_path.to_path_buf())?;
    store.ensure_recent_defaults();

    let selected = select_llm_interface(&store, args.interface)?;
    let profile = store
        .config()
        .get_llm_profile(&selected)
        .cloned()
        .ok_or_else(|| CliError::UnknownInterface(selected.clone()))?;

    sink.log(LogRecord::new(
        LogLevel::Info,
        format!("开始测试 LLM 配置：{selected}"),
    ));
    sink.log(LogRecord::new(
        LogLevel::Debug,
        format!(
            "模型: {} | 接口模式: {} | Base URL: {} | 密钥变量: {}",
            profile.model_name, profile.interface_format, profile.base_url, profile.api_key_env
        ),
    ));

    let adapter = create_llm_adapter(store.config(), &selected)?;
    match adapter.invoke("Please reply 'OK'") {
        Ok(response) if response.trim().is_empty() => {
            sink.log(LogRecord::new(
                LogLevel::Error,
                "❌ LLM配置测试失败：未获取到响应".to_string(),
            ));
            return Err(CliError::TestFailed(
                "LLM配置测试失败：未获取到响应".to_string(),
            ));
        }
        Ok(response) => {
            sink.log(LogRecord::new(
                LogLevel::Info,
                "✅ LLM配置测试成功！".to_string(),
            ));
            sink.log(LogRecord::new(
                LogLevel::Debug,
                format!("测试回复: {response}"),
            ));
        }
        Err(err) => {
            sink.log(LogRecord::new(
                LogLevel::Error,
                format!("❌ LLM配置测试出错（{}）: {err}", err.kind()),
            ));
            return Err(CliError::Model(err));
        }
    }

    store.touch_llm_interface(selected);
    store.save()?;
    Ok(())
}

fn select_llm_interface(
    store: &ConfigStore,
    preferred: Option<String>,
) -> Result<String, CliError> {
    if let Some(name) = normalize_preference(preferred) {
        if store.config().llm_profiles.contains_key(&name) {
            return Ok(name);
        }
        return Err(CliError::UnknownInterface(name));
    }

    if let Some(name) = store.last_llm_interface() {
        return Ok(name.to_string());
    }

    store
        .config()
        .llm_profiles
        .keys()
        .next()
        .cloned()
        .ok_or(CliError::MissingLlmProfile)
}

fn normalize_preference(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|name| !name.is_empty())
}

#[derive(Debug, Error)]
enum CliError {
    #[error("配置文件错误: {0}")]
    Config(#[from] longform_core::ConfigError),
    #[error("缺少可用的 LLM 配置。")]
    MissingLlmProfile,
    #[error("未找到名为 `{0}` 的接口配置")]
    UnknownInterface(String),
    #[error("写入文件 `{path}` 失败: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("适配器调用失败: {0}")]
    Adapter(#[from] AdapterError),
    #[error("LLM 调用失败: {0}")]
    Model(#[from] LanguageModelError),
    #[error("提示词加载失败: {0}")]
    Prompt(#[from] PromptError),
    #[error("{0}")]
    Narrative(#[from] NarrativeError),
    #[error("{0}")]
    Snapshot(#[from] SnapshotError),
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    TestFailed(String),
}

#[derive(Parser)]
#[command(
    name = "longformctl",
    version,
    about = "长篇小说逐章生成命令行工具"
)]
struct Cli {
    /// 指定配置文件路径
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    /// 会话状态文件路径
    #[arg(long, global = true, default_value = "longform_session.json")]
    session: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 开始创作一部新小说并生成第一章
    Start(StartArgs),
    /// 续写下一章；达到目标章节后写尾声
    Continue(ContinueArgs),
    /// 查看当前创作进度
    Status(StatusArgs),
    /// 清空当前创作状态
    Reset,
    /// 导出全文
    Export(ExportArgs),
    /// 角色相关操作
    #[command(subcommand)]
    Character(CharacterCommand),
    /// 配置相关操作
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum CharacterCommand {
    /// 为正在创作的小说追加角色
    Add(CharacterAddArgs),
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// 测试当前 LLM 接口配置
    TestLlm(TestLlmArgs),
}

#[derive(Args)]
struct StartArgs {
    /// 小说标题
    #[arg(long)]
    title: String,
    /// 小说类型，例如 都市、玄幻、爱情
    #[arg(long)]
    genre: String,
    /// 主角姓名
    #[arg(long)]
    protagonist: String,
    /// 主角描述
    #[arg(long, value_name = "TEXT")]
    description: Option<String>,
    /// 故事大纲
    #[arg(long, value_name = "TEXT")]
    outline: Option<String>,
    /// 目标章节数（1-1000），默认取配置
    #[arg(long, value_name = "N")]
    chapters: Option<u32>,
    /// 每章字数（1000-5000）
    #[arg(long, value_name = "N")]
    length: Option<u32>,
    /// 写作风格，默认取配置
    #[arg(long)]
    style: Option<String>,
    /// 指定 LLM 接口名称
    #[arg(long)]
    llm_interface: Option<String>,
    /// 丢弃正在进行的创作后重新开始
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct ContinueArgs {
    /// 连续续写的单元数
    #[arg(long, value_name = "N", default_value_t = 1)]
    count: u32,
    /// 指定 LLM 接口名称
    #[arg(long)]
    llm_interface: Option<String>,
}

#[derive(Args)]
struct StatusArgs {
    /// 按生成时的格式重新显示最新一章
    #[arg(long)]
    latest: bool,
}

#[derive(Args)]
struct ExportArgs {
    /// 输出文件，缺省时打印到标准输出
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct CharacterAddArgs {
    /// 角色姓名
    #[arg(long)]
    name: String,
    /// 角色描述
    #[arg(long, value_name = "TEXT")]
    description: Option<String>,
    /// 角色定位
    #[arg(long, default_value = "配角")]
    role: String,
}

#[derive(Args)]
struct TestLlmArgs {
    /// 指定要测试的接口名称，默认为最近使用的接口
    #[arg(long)]
    interface: Option<String>,
}
