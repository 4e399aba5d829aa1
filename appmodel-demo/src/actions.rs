//! File and Edit actions of the demo application.

use std::sync::Arc;

use appmodel_api::{CommandRule, Icon, KeyBindingRule, MenuRule, Value};
use appmodel_kernel::{Action, Args, Callback, Context};
use parking_lot::Mutex;

pub const FILE_MENU: &str = "file";
pub const EDIT_MENU: &str = "edit";

/// Shared clipboard handed to commands through injection.
#[derive(Debug, Clone, Default)]
pub struct Clipboard(Arc<Mutex<Option<String>>>);

impl Clipboard {
    pub fn get(&self) -> Option<String> {
        self.0.lock().clone()
    }

    pub fn set(&self, text: impl Into<String>) {
        *self.0.lock() = Some(text.into());
    }
}

fn context(args: &Args) -> anyhow::Result<&Arc<Context>> {
    args.require::<Arc<Context>>("context")
}

fn open(args: &Args) -> anyhow::Result<Value> {
    let path = args.get::<String>("path").cloned().unwrap_or_else(|| "untitled.txt".to_string());
    tracing::info!(%path, "open");
    let ctx = context(args)?;
    ctx.set("file_open", true);
    ctx.set("file_name", path.clone());
    Ok(Value::String(path))
}

fn close(args: &Args) -> anyhow::Result<Value> {
    let ctx = context(args)?;
    tracing::info!(file = %ctx.get("file_name"), "close");
    ctx.update([("file_open", Value::Bool(false)), ("file_name", Value::Null)]);
    Ok(Value::Null)
}

fn undo(_: &Args) -> anyhow::Result<Value> {
    tracing::info!("undo");
    Ok(Value::Null)
}

fn redo(_: &Args) -> anyhow::Result<Value> {
    tracing::info!("redo");
    Ok(Value::Null)
}

fn copy(args: &Args) -> anyhow::Result<Value> {
    let clipboard = args.require::<Clipboard>("clipboard")?;
    let selection = context(args)?.get("selection");
    let text = selection
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("nothing selected"))?
        .to_string();
    clipboard.set(text.clone());
    context(args)?.set("clipboard_has_text", true);
    tracing::info!(%text, "copy");
    Ok(Value::String(text))
}

fn cut(args: &Args) -> anyhow::Result<Value> {
    let text = copy(args)?;
    context(args)?.remove("selection");
    tracing::info!("cut");
    Ok(text)
}

fn paste(args: &Args) -> anyhow::Result<Value> {
    let clipboard = args.require::<Clipboard>("clipboard")?;
    let text = clipboard.get().unwrap_or_default();
    tracing::info!(%text, "paste");
    Ok(Value::String(text))
}

fn with_context(callback: Callback) -> Callback {
    callback.param::<Arc<Context>>("context")
}

fn with_clipboard(callback: Callback) -> Callback {
    with_context(callback).param::<Clipboard>("clipboard")
}

/// Every demo action.
pub fn all() -> Vec<Action> {
    vec![
        Action::new(CommandRule::new("file.open", "Open"), with_context(Callback::new(open)))
            .icon(Icon::new("folder-open"))
            .menu(MenuRule::new(FILE_MENU).group("1_open"))
            .keybinding(KeyBindingRule::new("CtrlCmd+O")),
        Action::new(CommandRule::new("file.close", "Close"), with_context(Callback::new(close)))
            .icon(Icon::new("rectangle-xmark"))
            .enablement("file_open")
            .menu(MenuRule::new(FILE_MENU).group("2_close"))
            .keybinding(KeyBindingRule::new("CtrlCmd+W")),
        Action::new(CommandRule::new("edit.undo", "Undo"), Callback::new(undo))
            .icon(Icon::new("rotate-left"))
            .menu(MenuRule::new(EDIT_MENU).group("1_undo_redo").order(1.0))
            .keybinding(KeyBindingRule::new("CtrlCmd+Z")),
        Action::new(CommandRule::new("edit.redo", "Redo"), Callback::new(redo))
            .icon(Icon::new("rotate-right"))
            .menu(MenuRule::new(EDIT_MENU).group("1_undo_redo").order(2.0))
            .keybinding(KeyBindingRule::new("CtrlCmd+Shift+Z").win("Ctrl+Y")),
        Action::new(CommandRule::new("edit.cut", "Cut"), with_clipboard(Callback::new(cut)))
            .icon(Icon::new("scissors"))
            .enablement("selection")
            .menu(MenuRule::new(EDIT_MENU).group("3_copypaste").order(1.0))
            .keybinding(KeyBindingRule::new("CtrlCmd+X")),
        Action::new(CommandRule::new("edit.copy", "Copy"), with_clipboard(Callback::new(copy)))
            .icon(Icon::new("copy"))
            .enablement("selection")
            .menu(MenuRule::new(EDIT_MENU).group("3_copypaste").order(2.0))
            .keybinding(KeyBindingRule::new("CtrlCmd+C")),
        Action::new(CommandRule::new("edit.paste", "Paste"), with_clipboard(Callback::new(paste)))
            .icon(Icon::new("paste"))
            .enablement("clipboard_has_text")
            .menu(MenuRule::new(EDIT_MENU).group("3_copypaste").order(3.0))
            .keybinding(KeyBindingRule::new("CtrlCmd+V")),
    ]
}
