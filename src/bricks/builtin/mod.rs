// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Built-in brick implementations.
//!
//! The control-flow bricks run their pipeline arguments through
//! [`ExecutionServices`](crate::runtime::ExecutionServices), never through the
//! reducer directly.

mod for_each;
mod html;
mod identity;
mod if_else;
mod map;
mod raise;
mod retry;
mod try_except;

pub use for_each::ForEachBrick;
pub use html::HtmlBrick;
pub use identity::IdentityBrick;
pub use if_else::IfElseBrick;
pub use map::MapBrick;
pub use raise::ErrorBrick;
pub use retry::RetryBrick;
pub use try_except::TryExceptBrick;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::api_version::ApiVersion;
    use crate::bricks::{Brick, BrickRegistryBuilder};
    use crate::error::RuntimeResult;
    use crate::pipeline::parse_pipeline;
    use crate::runtime::{ExecutionServices, InitialValues, PipelineReducer, ReduceOptions};
    use crate::types::{BrickDefinition, BrickKind};

    /// Records every `@element` it sees and returns its args.
    #[derive(Default)]
    pub struct RecorderBrick {
        pub seen: std::sync::Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl Brick for RecorderBrick {
        fn definition(&self) -> BrickDefinition {
            BrickDefinition::new("@test/record", "Record", BrickKind::Effect)
        }

        async fn run(&self, args: Value, services: &ExecutionServices) -> RuntimeResult<Value> {
            let element = services.ctxt.get("@element").cloned().unwrap_or(Value::Null);
            self.seen.lock().unwrap().push(element);
            Ok(args)
        }
    }

    pub fn pipeline(steps: Value) -> Value {
        json!({"__type__": "pipeline", "__value__": steps})
    }

    /// Run `steps` with the built-ins plus a recorder.
    pub async fn run(
        steps: Value,
        input: Value,
        version: ApiVersion,
    ) -> (RuntimeResult<Value>, Arc<RecorderBrick>) {
        let recorder = Arc::new(RecorderBrick::default());
        let mut builder = BrickRegistryBuilder::new();
        builder.with_builtins().register_boxed(recorder.clone());
        let reducer = PipelineReducer::new(Arc::new(builder.build()));

        let steps = parse_pipeline(&steps).unwrap();
        let result = reducer
            .reduce_pipeline(&steps, InitialValues::new(input), ReduceOptions::new(version))
            .await;
        (result, recorder)
    }
}
