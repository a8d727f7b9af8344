//! The standard operator library: the control-flow, loop, variable, debug,
//! and pure-data operators a node-graph host wires up by default, built on
//! top of `flowgraph-core`'s binding traits alone. None of these operators
//! reach into the runtime directly — they are ordinary
//! [`flowgraph_core::binding::DeclaredOperator`] implementations driven
//! through the same [`flowgraph_core::context::ExecutionContext`] facade a
//! host's own custom operators use.

pub mod control;
pub mod data;
pub mod debug;
pub mod events;
pub mod loops;
pub mod streaming;
pub mod variables;

use flowgraph_core::OperatorRegistry;

/// Definition ids under which the standard library registers itself. A host
/// wiring up a fresh [`OperatorRegistry`] calls [`register_standard_library`]
/// once, then layers its own domain operators on top.
pub mod ids {
    pub const BRANCH: &str = "flow.branch";
    pub const SEQUENCE: &str = "flow.sequence";
    pub const GATE: &str = "flow.gate";
    pub const ONCE: &str = "flow.once";
    pub const TRY_CATCH: &str = "flow.try_catch";

    pub const FOR_LOOP: &str = "flow.for_loop";
    pub const WHILE_LOOP: &str = "flow.while_loop";
    pub const DO_WHILE_LOOP: &str = "flow.do_while_loop";
    pub const REPEAT_UNTIL: &str = "flow.repeat_until";
    pub const FOR_EACH: &str = "flow.for_each";
    pub const PARALLEL_FOR_EACH: &str = "flow.parallel_for_each";
    pub const LIST_STREAM: &str = "flow.list_stream";

    pub const SET_VARIABLE: &str = "flow.set_variable";
    pub const GET_VARIABLE: &str = "flow.get_variable";

    pub const DEBUG_PRINT: &str = "flow.debug_print";
    pub const DELAY: &str = "flow.delay";

    pub const TRIGGER_EVENT: &str = "flow.trigger_event";

    pub const ADD: &str = "data.math.add";
    pub const SUB: &str = "data.math.sub";
    pub const MUL: &str = "data.math.mul";
    pub const DIV: &str = "data.math.div";
    pub const CONCAT: &str = "data.string.concat";
    pub const TO_UPPER: &str = "data.string.to_upper";
    pub const TO_LOWER: &str = "data.string.to_lower";
    pub const LIST_LEN: &str = "data.list.len";
    pub const LIST_GET: &str = "data.list.get";
    pub const DICT_GET: &str = "data.dict.get";
    pub const DICT_SET: &str = "data.dict.set";
    pub const JSON_PARSE: &str = "data.json.parse";
    pub const JSON_STRINGIFY: &str = "data.json.stringify";
}

/// Register every standard operator into `registry` under its conventional
/// definition id and display name.
pub fn register_standard_library(registry: &mut OperatorRegistry) {
    control::register(registry);
    loops::register(registry);
    streaming::register(registry);
    variables::register(registry);
    debug::register(registry);
    data::register(registry);
    events::register(registry);
}
