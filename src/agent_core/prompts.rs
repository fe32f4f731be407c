//! System prompt for the weather assistant.

use crate::mcp_client::catalog::ToolCatalog;

const INSTRUCTIONS: &str = "\
You are a helpful assistant specializing in weather information.

Core instructions:
1. Analyze the request carefully. Decide whether the user needs weather \
warnings, a forecast, or both.
2. Only ask for warnings with get_weather_warning and only ask for the \
forecast with get_daily_forecast. When the question covers both (for example \
warnings plus whether an outdoor activity is a good idea), call both tools, \
warnings first.
3. Wait for each tool result before deciding on the next call or the answer.
4. For activity questions, look at least 2-3 days ahead. Treat vague periods \
such as \"recently\" as current conditions plus the next few days.
5. Pass a city id (Beijing is '101010100'), 'lon,lat' coordinates, or the \
city name as `location`. Do not invent times of day the user did not ask for.
6. Once you have what you need, answer every part of the question and give a \
clear recommendation grounded in the warning status, temperatures, \
conditions, and wind.";

/// Build the system prompt, listing the tools the server actually offers.
pub fn build_system_prompt(catalog: &ToolCatalog) -> String {
    let mut prompt = String::from(INSTRUCTIONS);
    if catalog.is_empty() {
        prompt.push_str("\n\nNo tools are available; answer from general knowledge and say so.");
        return prompt;
    }

    prompt.push_str("\n\nAvailable tools:");
    for tool in catalog.iter() {
        let params = tool.required_fields().join(", ");
        prompt.push_str(&format!("\n- {}({params}): {}", tool.name, tool.description));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::catalog::ToolDescriptor;
    use crate::weather::server::tool_definitions;

    #[test]
    fn test_prompt_lists_discovered_tools() {
        let catalog =
            ToolCatalog::from_descriptors(tool_definitions().into_iter().map(ToolDescriptor::from));
        let prompt = build_system_prompt(&catalog);

        assert!(prompt.starts_with("You are a helpful assistant"));
        assert!(prompt.contains("- get_weather_warning(location): Get active weather"));
        assert!(prompt.contains("- get_daily_forecast(location): Get the daily weather"));
    }

    #[test]
    fn test_prompt_without_tools() {
        let prompt = build_system_prompt(&ToolCatalog::from_descriptors(Vec::new()));
        assert!(prompt.contains("No tools are available"));
        assert!(!prompt.contains("Available tools"));
    }
}
