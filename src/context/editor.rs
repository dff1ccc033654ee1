//! Editor-context source backed by a running Neovim instance.
//!
//! Locates an nvim server socket — preferring one owned by the focused X11
//! window, falling back to any running instance — and queries it over
//! `nvim --server <socket> --remote-expr`.  In insert mode the hint is the
//! text surrounding the cursor with a cursor sigil spliced in; in
//! normal/visual/command mode it is the visible viewport text.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{ContextError, EditorContextProvider};

/// Lines of context fetched above and below the cursor in insert mode.
const INSERT_CONTEXT_LINES: usize = 20;

/// Marker spliced into the insert-mode hint at the cursor position.
const CURSOR_SIGIL: &str = "{{CURSOR}}";

/// Returns the cursor-surrounding text in insert mode, empty otherwise.
const INSERTION_TEXT_LUA: &str = r#"
local mode = vim.api.nvim_get_mode()["mode"]
local num_lines = @NUM_LINES@
local sigil = "@SIGIL@"

if mode == "i" then
    local current_line = vim.api.nvim_win_get_cursor(0)[1]
    local total_lines = vim.api.nvim_buf_line_count(0)

    local start_line = math.max(1, current_line - num_lines)
    local end_line = math.min(total_lines, current_line + num_lines)

    local before = vim.api.nvim_buf_get_lines(0, start_line - 1, current_line - 1, false)
    local after = vim.api.nvim_buf_get_lines(0, current_line, end_line, false)

    local cursor_pos = vim.api.nvim_win_get_cursor(0)[2]
    local current_line_text = vim.api.nvim_buf_get_lines(0, current_line - 1, current_line, false)[1]
    local before_cursor = string.sub(current_line_text, 1, cursor_pos)
    local after_cursor = string.sub(current_line_text, cursor_pos + 1)

    local lines = {}
    for _, line in ipairs(before) do
        table.insert(lines, line)
    end
    table.insert(lines, before_cursor .. sigil .. after_cursor)
    for _, line in ipairs(after) do
        table.insert(lines, line)
    end

    return table.concat(lines, "\n")
end

return ""
"#;

/// Returns the visible text of every window in the current tabpage, each
/// framed with a filename:range header.
const VISIBLE_TEXT_LUA: &str = r#"
local three_ticks = string.rep(string.char(96), 3)
local CONTEXT_EXTEND = 20

local function get_context(win_id)
    if not win_id then
        win_id = 0
    end

    local out
    vim.api.nvim_win_call(win_id, function()
        local filename = vim.fn.expand("%")
        local first_visible = math.max(1, vim.fn.line("w0") - CONTEXT_EXTEND)
        local last_visible = math.min(vim.fn.line("$"), vim.fn.line("w$") + CONTEXT_EXTEND)

        if first_visible < 20 then
            first_visible = 1
        end

        local visible_lines = vim.api.nvim_buf_get_lines(0, first_visible - 1, last_visible, false)
        local header = string.format("%s:%d-%d", filename, first_visible, last_visible)

        out = "START " .. header .. "\n" .. three_ticks .. "\n"
            .. table.concat(visible_lines, "\n") .. "\n" .. three_ticks .. "\nEND " .. header
    end)

    return out
end

local contexts = {}
for _, win_id in ipairs(vim.api.nvim_tabpage_list_wins(0)) do
    table.insert(contexts, get_context(win_id))
end

return table.concat(contexts, "\n")
"#;

// ---------------------------------------------------------------------------
// NvimContextProvider
// ---------------------------------------------------------------------------

/// Queries a running Neovim server for viewport / cursor context.
pub struct NvimContextProvider;

impl NvimContextProvider {
    pub fn new() -> Self {
        Self
    }

    async fn gather_inner(&self) -> Result<String, ContextError> {
        let socket = match find_active_nvim_socket().await {
            Ok(socket) => socket,
            Err(e) => {
                log::debug!("context: no nvim under the active window ({e}), trying any");
                find_first_nvim_socket().await?
            }
        };
        log::debug!("context: using nvim socket {}", socket.display());

        let mode = remote_expr(&socket, "mode()").await?;
        match mode.trim().chars().next() {
            Some('i') => {
                let lua = INSERTION_TEXT_LUA
                    .replace("@NUM_LINES@", &INSERT_CONTEXT_LINES.to_string())
                    .replace("@SIGIL@", CURSOR_SIGIL);
                let text = remote_lua(&socket, &lua).await?;
                Ok(format!(
                    "The user is inserting into a text editor with the \
                     following content. The cursor is located at \
                     {CURSOR_SIGIL}:\n{text}"
                ))
            }
            Some('n') | Some('v') | Some('V') | Some('c') => {
                let text = remote_lua(&socket, VISIBLE_TEXT_LUA).await?;
                Ok(format!(
                    "The user is in a text editor with the following \
                     content:\n{text}"
                ))
            }
            _ => Err(ContextError::Editor(format!(
                "unhandled nvim mode: {mode:?}"
            ))),
        }
    }
}

impl Default for NvimContextProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EditorContextProvider for NvimContextProvider {
    async fn context(&self, cancel: CancellationToken) -> Result<String, ContextError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ContextError::Cancelled),
            result = self.gather_inner() => result,
        }
    }
}

// ---------------------------------------------------------------------------
// Socket discovery
// ---------------------------------------------------------------------------

/// The default nvim server socket path for a PID, if it exists.
fn socket_for_pid(pid: &str) -> Option<PathBuf> {
    let uid = current_uid()?;
    let socket = PathBuf::from(format!("/run/user/{uid}/nvim.{pid}.0"));
    socket.exists().then_some(socket)
}

#[cfg(unix)]
fn current_uid() -> Option<u32> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata("/proc/self").ok().map(|m| m.uid())
}

#[cfg(not(unix))]
fn current_uid() -> Option<u32> {
    None
}

async fn shell_output(script: &str) -> Result<String, ContextError> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(script)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ContextError::Editor(e.to_string()))?;
    if !output.status.success() {
        return Err(ContextError::Editor(format!(
            "`{script}` exited with {}",
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Find the nvim socket belonging to the focused X11 window by walking the
/// window owner's process tree.
async fn find_active_nvim_socket() -> Result<PathBuf, ContextError> {
    let pid = shell_output(
        r#"xprop -root _NET_ACTIVE_WINDOW | awk '{print $5}' \
           | xargs -I {} xprop -id {} _NET_WM_PID | awk '{print $3}'"#,
    )
    .await?;
    if pid.is_empty() {
        return Err(ContextError::Editor("no active window found".into()));
    }

    let mut pending = vec![pid.clone()];
    while let Some(current) = pending.pop() {
        if let Some(socket) = socket_for_pid(&current) {
            return Ok(socket);
        }
        if let Ok(children) = shell_output(&format!("pgrep -P {current}")).await {
            pending.extend(
                children
                    .lines()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from),
            );
        }
    }

    Err(ContextError::Editor(format!(
        "no nvim process under active window PID {pid}"
    )))
}

/// Find any running nvim instance of the current user with a server socket.
async fn find_first_nvim_socket() -> Result<PathBuf, ContextError> {
    let pids = shell_output("pgrep -u $USER -x nvim").await?;
    pids.lines()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .find_map(socket_for_pid)
        .ok_or_else(|| ContextError::Editor("no running nvim instance with a socket".into()))
}

// ---------------------------------------------------------------------------
// Remote execution
// ---------------------------------------------------------------------------

/// Evaluate a vimscript expression on the nvim server.
async fn remote_expr(socket: &PathBuf, expr: &str) -> Result<String, ContextError> {
    let output = Command::new("nvim")
        .arg("--server")
        .arg(socket)
        .arg("--remote-expr")
        .arg(expr)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ContextError::Editor(e.to_string()))?;

    if !output.status.success() {
        return Err(ContextError::Editor(format!(
            "remote-expr failed ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(strip_ansi(&String::from_utf8_lossy(&output.stdout)))
}

/// Evaluate a Lua chunk on the nvim server, returning its result.
async fn remote_lua(socket: &PathBuf, lua: &str) -> Result<String, ContextError> {
    let escaped = lua.replace('\'', "''");
    let expr = format!("luaeval('(function() {escaped} end)()')");
    remote_expr(socket, &expr).await
}

/// Remove ANSI color escape sequences (`ESC [ … m`) from nvim's output.
fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for seq in chars.by_ref() {
                if seq == 'm' {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
