//! Demonstration plugin: one command, one matcher.
//!
//! ```toml
//! example = "Example"
//! ```

use super::urls::find_urls;
use super::{EventContext, Export, Plugin, Reply};

pub struct ExamplePlugin;

impl Plugin for ExamplePlugin {
    fn lookup(&self, symbol: &str) -> Option<Export> {
        match symbol {
            "Example" => Some(Export::command(example)),
            "ExampleMatcher" => Some(Export::matcher(example_matcher)),
            _ => None,
        }
    }

    fn matchers(&self) -> Option<Vec<String>> {
        Some(vec!["ExampleMatcher".to_string()])
    }
}

/// Echo the caller and the arguments back.
fn example(args: &[String], ctx: &EventContext) -> Reply {
    Reply::say(format!("caller: {}, args: {}", ctx.nick, args.join(",")))
}

/// Point out any web addresses in the message.
fn example_matcher(message: &str, _ctx: &EventContext) -> Reply {
    let urls = find_urls(message);
    if urls.is_empty() {
        return Reply::none();
    }
    Reply::say(format!("I found web address: {}", urls.join(", ")))
}
