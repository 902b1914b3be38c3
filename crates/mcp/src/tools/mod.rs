mod registry;

pub use registry::{
    json_schema_empty, json_schema_integer, json_schema_object, json_schema_string, Tool,
    ToolRegistry,
};
