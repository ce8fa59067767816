//! # diffit-engine
//!
//! A line-oriented text diff engine exposed to Lua.
//!
//! Given two texts, the engine computes a minimal line edit script (Myers),
//! groups it into contextual hunks, and reports change statistics. Large
//! inputs can be fed incrementally, diffs can run on a worker pool, and a
//! virtual scroll index maps scroll offsets to the rows worth rendering.
//!
//! ## Architecture
//!
//! - `tokenizer` - Splits text into lines and builds comparison keys
//! - `myers` - Shortest edit script over line tokens
//! - `hunks` - Groups an edit script into hunks with context
//! - `diff` - Options, result types, statistics and the one-shot entry point
//! - `streaming` - Chunked accumulation with intermediate results
//! - `pool` - Worker threads with correlated request/response messages
//! - `virtual_scroll` - Visible row window for fixed-height rows
//! - `lib` (this module) - Lua bindings
//!
//! ## Usage from Lua
//!
//! ```lua
//! local engine = require("diffit_engine")
//!
//! -- One-shot diff; options are optional and use camelCase keys
//! local result = engine.compute_diff(old_text, new_text, { contextLines = 5 })
//! print(result.stats.additions, result.hunks[1].header)
//!
//! -- The same result as a JSON string
//! local json = engine.compute_diff_json(old_text, new_text)
//!
//! -- Chunked input
//! local stream = engine.new_streaming({ ignoreWhitespace = true })
//! stream:add_old_chunk(part1)
//! stream:add_new_chunk(part2)
//! local final = stream:finalize()
//!
//! -- Background computation
//! local pool = engine.new_pool(4)
//! pool:submit(1, old_text, new_text)
//! local response = pool:wait() -- { id = 1, result = {...} } or { id = 1, error = "..." }
//!
//! -- Virtual scrolling over the rendered rows
//! local scroll = engine.new_virtual_scroll(#rows, 40)
//! local range = scroll:update_viewport(scroll_top, 40)
//! ```
//!
//! ## Logging
//!
//! Log output goes through `env_logger`; set `RUST_LOG=diffit_engine=debug`
//! before starting the host to see timings.

use mlua::SerializeOptions;
use mlua::prelude::*;
use serde::{Deserialize, Serialize};

pub mod diff;
pub mod error;
pub mod hunks;
pub mod myers;
pub mod pool;
pub mod streaming;
pub mod tokenizer;
pub mod virtual_scroll;

use diff::{DiffEngine, DiffOptions, DiffResult};
use error::DiffError;
use pool::{DiffPool, DiffRequest, DiffResponse};
use streaming::{StreamState, StreamingProcessor};
use virtual_scroll::VirtualScrollIndex;

impl From<DiffError> for LuaError {
    fn from(err: DiffError) -> Self {
        LuaError::external(err)
    }
}

/// Converts any result type to a Lua table, leaving `None` fields unset.
fn to_lua<T: Serialize>(lua: &Lua, value: &T) -> LuaResult<LuaValue> {
    lua.to_value_with(value, SerializeOptions::new().serialize_none_to_null(false))
}

/// Reads an options table, or defaults when absent or `nil`.
///
/// Validation is left to the operation receiving the options.
fn options_from_lua(lua: &Lua, value: Option<LuaValue>) -> Result<DiffOptions, DiffError> {
    match value {
        None | Some(LuaNil) => Ok(DiffOptions::default()),
        Some(value) => lua
            .from_value(value)
            .map_err(|e| DiffError::invalid_options(e.to_string())),
    }
}

#[inline]
fn state_name(state: StreamState) -> &'static str {
    match state {
        StreamState::Empty => "empty",
        StreamState::Accumulating => "accumulating",
        StreamState::Finalized => "finalized",
        StreamState::Disposed => "disposed",
    }
}

/// A Lua-owned value that can be released early with `dispose()`.
struct Handle<T>(Option<T>);

impl<T> Handle<T> {
    fn new(value: T) -> Self {
        Self(Some(value))
    }

    fn get(&self) -> Result<&T, DiffError> {
        self.0
            .as_ref()
            .ok_or_else(|| DiffError::invalid_state("disposed"))
    }

    fn get_mut(&mut self) -> Result<&mut T, DiffError> {
        self.0
            .as_mut()
            .ok_or_else(|| DiffError::invalid_state("disposed"))
    }

    fn take(&mut self) -> Result<T, DiffError> {
        self.0
            .take()
            .ok_or_else(|| DiffError::invalid_state("disposed"))
    }

    fn dispose(&mut self) {
        self.0 = None;
    }
}

impl LuaUserData for Handle<DiffEngine> {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_method_mut("set_options", |lua, this, opts: Option<LuaValue>| {
            let options = options_from_lua(lua, opts)?;
            this.get_mut()?.set_options(options)?;
            Ok(())
        });
        methods.add_method("options", |lua, this, ()| to_lua(lua, this.get()?.options()));
        methods.add_method("compute", |lua, this, (old, new): (String, String)| {
            let result = this.get()?.compute(&old, &new)?;
            to_lua(lua, &result)
        });
        methods.add_method("streaming", |_, this, ()| {
            Ok(Handle::new(this.get()?.streaming()))
        });
        methods.add_method_mut("dispose", |_, this, ()| {
            this.dispose();
            Ok(())
        });
    }
}

impl LuaUserData for Handle<StreamingProcessor> {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_method_mut("add_old_chunk", |_, this, chunk: String| {
            this.get_mut()?.add_old_chunk(&chunk)?;
            Ok(())
        });
        methods.add_method_mut("add_new_chunk", |_, this, chunk: String| {
            this.get_mut()?.add_new_chunk(&chunk)?;
            Ok(())
        });
        methods.add_method_mut("finish_old", |_, this, ()| {
            this.get_mut()?.finish_old()?;
            Ok(())
        });
        methods.add_method_mut("finish_new", |_, this, ()| {
            this.get_mut()?.finish_new()?;
            Ok(())
        });
        methods.add_method("intermediate_result", |lua, this, ()| {
            to_lua(lua, &this.get()?.intermediate_result())
        });
        methods.add_method_mut("finalize", |lua, this, ()| {
            let result = this.get_mut()?.finalize()?;
            to_lua(lua, &result)
        });
        methods.add_method("state", |_, this, ()| {
            Ok(this
                .0
                .as_ref()
                .map_or("disposed", |processor| state_name(processor.state())))
        });
        methods.add_method_mut("dispose", |_, this, ()| {
            if let Some(processor) = this.0.as_mut() {
                processor.dispose();
            }
            this.dispose();
            Ok(())
        });
    }
}

impl LuaUserData for Handle<VirtualScrollIndex> {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_method_mut(
            "update_viewport",
            |lua, this, (scroll_top, viewport_lines): (f64, usize)| {
                let range = this.get_mut()?.update_viewport(scroll_top, viewport_lines);
                to_lua(lua, &range)
            },
        );
        methods.add_method("visible_range", |lua, this, ()| {
            to_lua(lua, &this.get()?.visible_range())
        });
        methods.add_method_mut("set_total_lines", |lua, this, total: usize| {
            let range = this.get_mut()?.set_total_lines(total);
            to_lua(lua, &range)
        });
        methods.add_method_mut("set_line_height", |lua, this, line_height: f64| {
            let range = this.get_mut()?.set_line_height(line_height)?;
            to_lua(lua, &range)
        });
        methods.add_method("scroll_to_line", |_, this, line: usize| {
            Ok(this.get()?.scroll_to_line(line))
        });
        methods.add_method("line_at_position", |_, this, position: f64| {
            Ok(this.get()?.line_at_position(position))
        });
        methods.add_method("visible_items", |lua, this, ()| {
            to_lua(lua, &this.get()?.visible_items())
        });
        methods.add_method("visible_fraction", |_, this, ()| {
            Ok(this.get()?.visible_fraction())
        });
        methods.add_method_mut("dispose", |_, this, ()| {
            this.dispose();
            Ok(())
        });
    }
}

/// One entry of a `compute_batch` call from Lua.
#[derive(Debug, Deserialize)]
struct BatchEntry {
    id: u64,
    old: String,
    new: String,
    #[serde(default)]
    options: Option<DiffOptions>,
}

impl From<BatchEntry> for DiffRequest {
    fn from(entry: BatchEntry) -> Self {
        Self {
            id: entry.id,
            old_text: entry.old,
            new_text: entry.new,
            options: entry.options.unwrap_or_default(),
        }
    }
}

impl IntoLua for DiffResponse {
    fn into_lua(self, lua: &Lua) -> LuaResult<LuaValue> {
        let table = lua.create_table()?;
        table.set("id", self.id)?;
        match self.result {
            Ok(result) => table.set("result", to_lua(lua, &result)?)?,
            Err(err) => table.set("error", err.to_string())?,
        }
        Ok(LuaValue::Table(table))
    }
}

impl LuaUserData for DiffPool {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_method_mut(
            "submit",
            |lua, this, (id, old, new, opts): (u64, String, String, Option<LuaValue>)| {
                let options = options_from_lua(lua, opts)?;
                this.submit(DiffRequest {
                    id,
                    old_text: old,
                    new_text: new,
                    options,
                })?;
                Ok(())
            },
        );
        methods.add_method_mut(
            "submit_streaming",
            |_, this, (id, stream): (u64, LuaAnyUserData)| {
                let processor = stream.borrow_mut::<Handle<StreamingProcessor>>()?.take()?;
                this.submit_streaming(id, processor)?;
                Ok(())
            },
        );
        methods.add_method_mut("poll", |lua, this, ()| {
            lua.create_sequence_from(this.poll())
        });
        methods.add_method_mut("wait", |_, this, ()| Ok(this.wait()?));
        methods.add_method("compute_batch", |lua, this, entries: LuaValue| {
            let entries: Vec<BatchEntry> = lua
                .from_value(entries)
                .map_err(|e| DiffError::invalid_options(e.to_string()))?;
            let responses = this.compute_batch(entries.into_iter().map(Into::into).collect())?;
            lua.create_sequence_from(responses)
        });
        methods.add_method("size", |_, this, ()| Ok(this.size()));
        methods.add_method("pending", |_, this, ()| Ok(this.pending()));
        methods.add_method_mut("shutdown", |_, this, ()| {
            this.shutdown();
            Ok(())
        });
    }
}

fn compute_diff(
    lua: &Lua,
    (old, new, opts): (String, String, Option<LuaValue>),
) -> LuaResult<LuaValue> {
    let options = options_from_lua(lua, opts)?;
    let result = diff::compute_diff(&old, &new, &options)?;
    to_lua(lua, &result)
}

fn compute_diff_json(
    lua: &Lua,
    (old, new, opts): (String, String, Option<LuaValue>),
) -> LuaResult<String> {
    let options = options_from_lua(lua, opts)?;
    let result: DiffResult = diff::compute_diff(&old, &new, &options)?;
    result.to_json().map_err(LuaError::external)
}

/// Creates the Lua module exports. Called by mlua when loaded via `require("diffit_engine")`.
#[mlua::lua_module]
fn diffit_engine(lua: &Lua) -> LuaResult<LuaTable> {
    // The host may load the module more than once; only the first init wins.
    let _ = env_logger::try_init();

    let exports = lua.create_table()?;
    exports.set("compute_diff", lua.create_function(compute_diff)?)?;
    exports.set("compute_diff_json", lua.create_function(compute_diff_json)?)?;
    exports.set(
        "new_engine",
        lua.create_function(|lua, opts: Option<LuaValue>| {
            let options = options_from_lua(lua, opts)?;
            Ok(Handle::new(DiffEngine::new(options)?))
        })?,
    )?;
    exports.set(
        "new_streaming",
        lua.create_function(|lua, opts: Option<LuaValue>| {
            let options = options_from_lua(lua, opts)?;
            Ok(Handle::new(StreamingProcessor::new(options)?))
        })?,
    )?;
    exports.set(
        "new_virtual_scroll",
        lua.create_function(
            |_, (total, viewport, line_height): (usize, usize, Option<f64>)| {
                let index = match line_height {
                    Some(line_height) => {
                        VirtualScrollIndex::with_line_height(total, viewport, line_height)?
                    }
                    None => VirtualScrollIndex::new(total, viewport),
                };
                Ok(Handle::new(index))
            },
        )?,
    )?;
    exports.set(
        "new_pool",
        lua.create_function(|_, size: Option<usize>| Ok(DiffPool::new(size)?))?,
    )?;
    exports.set(
        "viewport_lines_for_height",
        lua.create_function(|_, (height, line_height): (f64, Option<f64>)| {
            Ok(virtual_scroll::viewport_lines_for_height(
                height,
                line_height.unwrap_or(virtual_scroll::DEFAULT_LINE_HEIGHT),
            ))
        })?,
    )?;
    Ok(exports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_rejects_use_after_dispose() {
        let mut handle = Handle::new(DiffEngine::default());
        assert!(handle.get().is_ok());
        handle.dispose();
        assert_eq!(handle.get().unwrap_err(), DiffError::invalid_state("disposed"));
        assert!(handle.get_mut().is_err());
        assert!(handle.take().is_err());
    }

    #[test]
    fn test_handle_take_leaves_it_disposed() {
        let mut handle = Handle::new(StreamingProcessor::new(DiffOptions::default()).unwrap());
        handle.get_mut().unwrap().add_old_chunk("a").unwrap();
        let processor = handle.take().unwrap();
        assert_eq!(processor.state(), StreamState::Accumulating);
        assert!(handle.get().is_err());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(state_name(StreamState::Empty), "empty");
        assert_eq!(state_name(StreamState::Accumulating), "accumulating");
        assert_eq!(state_name(StreamState::Finalized), "finalized");
        assert_eq!(state_name(StreamState::Disposed), "disposed");
    }

    #[test]
    fn test_batch_entry_defaults_options() {
        let entry = BatchEntry {
            id: 4,
            old: "a".to_string(),
            new: "b".to_string(),
            options: None,
        };
        let request = DiffRequest::from(entry);
        assert_eq!(request.id, 4);
        assert_eq!(request.options, DiffOptions::default());
    }

    #[test]
    fn test_diff_error_converts_to_lua_error() {
        let err: LuaError = DiffError::invalid_state("disposed").into();
        assert!(err.to_string().contains("invalid state: disposed"));
    }
}
