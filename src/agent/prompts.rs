//! Prompt templates for the browsing loop
//!
//! Templates are plain immutable values handed to the decide step; nothing
//! here is global or mutable.

use chrono::Local;

use crate::agent::context_window::{ObservationMode, PDF_MARKER};
use crate::core::Task;

const ACTION_FORMAT: &str = "Correspondingly, Action should STRICTLY follow the format:
- Click [Numerical_Label]
- Type [Numerical_Label]; [Content]
- Scroll [Numerical_Label or WINDOW]; [up or down]
- Wait
- GoBack
- Google
- ANSWER; [content]";

const ACTION_LIST: &str = "1. Click a Web Element.
2. Delete existing content in a textbox and then type content.
3. Scroll up or down. Multiple scrolls are allowed to browse the webpage. Pay attention!! The default scroll is the whole window. If the scroll widget is located in a certain area of the webpage, then you have to specify a Web Element in that area. I would hover the mouse there and then scroll.
4. Wait. Typically used to wait for unfinished webpage processes, with a duration of 5 seconds.
5. Go back, returning to the previous webpage.
6. Google, directly jump to the Google search page. When you can't find information in some websites, try starting over with Google.
7. Answer. This action should only be chosen when all questions in the task have been solved.";

const MULTIMODAL_SYSTEM: &str = "Imagine you are a robot browsing the web, just like humans. Now you need to complete a task. In each iteration, you will receive an Observation that includes a screenshot of a webpage and some texts. This screenshot will feature Numerical Labels placed in the TOP LEFT corner of each Web Element.
Carefully analyze the visual information to identify the Numerical Label corresponding to the Web Element that requires interaction, then follow the guidelines and choose one of the following actions:
{actions}

{format}

Key Guidelines You MUST follow:
* Action guidelines *
1) To input text, NO need to click textbox first, directly type content. Sometimes you should click the search button to apply search filters. Try to use simple language when searching.
2) When selecting from the dropdown menu, please type your choice directly according to the options provided instead of clicking on it.
3) You must Distinguish between textbox and search button, don't type content into the button! If no textbox is found, you may need to click the search button first before the textbox is displayed.
4) Execute only one action per iteration.
5) STRICTLY Avoid repeating the same action if the webpage remains unchanged. You may have selected the wrong web element or numerical label. Continuous use of the Wait is also NOT allowed.
6) When a complex Task involves multiple questions or steps, select \"ANSWER\" only at the very end, after addressing all of these questions (steps). Flexibly combine your own abilities with the information in the web page. Double check the formatting requirements in the task when ANSWER.
* Web Browsing Guidelines *
1) Don't interact with useless web elements like Login, Sign-in, donation that appear in Webpages. Pay attention to Key Web Elements like search textbox and menu.
2) Visit video websites like YouTube is allowed BUT you can't play videos. Clicking to download PDF is allowed and will be analyzed by the Assistant API.
3) Focus on the numerical labels in the TOP LEFT corner of each rectangle (element). Ensure you don't mix them up with other numbers (e.g. Calendar) on the page.
4) Focus on the date in task, you must look for results that match the date. It may be necessary to find the correct year, month and day at calendar. Besides, today's date is {today}.
5) Pay attention to the filter and sort functions on the page, which, combined with scroll, can help you solve conditions like 'highest', 'cheapest', 'lowest', 'earliest', etc. Try your best to find the answer that best fits the task.

Your reply should strictly follow the format:
Thought: {Your brief thoughts (briefly summarize the info that will help ANSWER)}
Action: {One Action format you choose}

Then the User will provide:
Observation: {A labeled screenshot Given by User}";

const TEXT_ONLY_SYSTEM: &str = "Imagine you are a robot browsing the web, just like humans. Now you need to complete a task. In each iteration, you will receive an Accessibility Tree with numerical label representing information about the page, then follow the guidelines and choose one of the following actions:
{actions}

{format}

Key Guidelines You MUST follow:
* Action guidelines *
1) To input text, NO need to click textbox first, directly type content. After typing, the system automatically hits `ENTER` key. Sometimes you should click the search button to apply search filters. Try to use simple language when searching.
2) You must Distinguish between textbox and search button, don't type content into the button! If no textbox is found, you may need to click the search button first before the textbox is displayed.
3) Execute only one action per iteration.
4) STRICTLY Avoid repeating the same action if the webpage remains unchanged. You may have selected the wrong web element or numerical label. Continuous use of the Wait is also NOT allowed.
5) When a complex Task involves multiple questions or steps, select \"ANSWER\" only at the very end, after addressing all of these questions (steps). Flexibly combine your own abilities with the information in the web page. Double check the formatting requirements in the task when ANSWER.
* Web Browsing Guidelines *
1) Don't interact with useless web elements like Login, Sign-in, donation that appear in Webpages. Pay attention to Key Web Elements like search textbox and menu.
2) Visit video websites like YouTube is allowed BUT you can't play videos. Clicking to download PDF is allowed and will be analyzed by the Assistant API.
3) Focus on the date in task, you must look for results that match the date. It may be necessary to find the correct year, month and day at calendar. Besides, today's date is {today}.
4) Pay attention to the filter and sort functions on the page, which, combined with scroll, can help you solve conditions like 'highest', 'cheapest', 'lowest', 'earliest', etc. Try your best to find the answer that best fits the task.

Your reply should strictly follow the format:
Thought: {Your brief thoughts (briefly summarize the info that will help ANSWER)}
Action: {One Action format you choose}

Then the User will provide:
Observation: {Accessibility Tree of a web page}";

const ELEMENT_NOTE: &str = "I've provided the tag name of each element and the text it contains (if text exists). Note that <textarea> or <input> may be textbox, but not exactly. Not all elements are in the screenshot. You can identify them by visible or invisible words. Please focus more on the screenshot and then refer to the textual information.";

/// Answer recorded when the iteration cap is reached
pub const FORCED_ANSWER: &str = "Task could not be completed within the maximum allowed iterations.";

/// Text templates for every message the loop writes
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    pub multimodal_system: String,
    pub text_only_system: String,
    /// Fed back when the browser rejects an action
    pub action_failed: String,
    /// Fed back when a reply has no parsable action
    pub format_error: String,
    /// Fed back when an action references an element missing from the page
    pub stale_element: String,
    /// Lead-in for grounding context on the first turn
    pub grounding_intro: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            multimodal_system: MULTIMODAL_SYSTEM.to_string(),
            text_only_system: TEXT_ONLY_SYSTEM.to_string(),
            action_failed: "The action you have chosen cannot be executed. Please double-check if you have selected the wrong Numerical Label or Action or Action format. Then provide the revised Thought and Action.".to_string(),
            format_error: "Format ERROR: Both 'Thought' and 'Action' should be included in your reply, and the Action must follow one of the listed formats.".to_string(),
            stale_element: "The Numerical Label {index} does not exist on the current page. Please choose a label from the latest Observation and provide the revised Thought and Action.".to_string(),
            grounding_intro: "Here's the following operating manual provides suggestions: ".to_string(),
        }
    }
}

impl PromptTemplates {
    /// System prompt for the given mode with today's local date filled in
    pub fn system_prompt(&self, mode: ObservationMode) -> String {
        let today = Local::now().format("%Y-%m-%d").to_string();
        self.system_prompt_on(mode, &today)
    }

    pub fn system_prompt_on(&self, mode: ObservationMode, today: &str) -> String {
        let template = match mode {
            ObservationMode::Multimodal => &self.multimodal_system,
            ObservationMode::TextOnly => &self.text_only_system,
        };
        template
            .replace("{actions}", ACTION_LIST)
            .replace("{format}", ACTION_FORMAT)
            .replace("{today}", today)
    }

    /// The first user turn: task statement, optional grounding, then the page
    pub fn first_turn(
        &self,
        task: &Task,
        grounding: Option<&str>,
        mode: ObservationMode,
        page_text: &str,
    ) -> String {
        let mut msg = format!(
            "Now given a task: {}  Please interact with {} and get the answer. \n",
            task.ques, task.web
        );
        if let Some(context) = grounding {
            msg.push_str(&self.grounding_intro);
            msg.push_str(context);
            msg.push('\n');
        }
        match mode {
            ObservationMode::Multimodal => {
                msg.push_str("Observation: please analyze the attached screenshot and give the Thought and Action. ");
                msg.push_str(ELEMENT_NOTE);
            }
            ObservationMode::TextOnly => {
                msg.push_str("Observation: please analyze the accessibility tree and give the Thought and Action.");
            }
        }
        msg.push('\n');
        msg.push_str(page_text);
        msg
    }

    /// A follow-up observation turn
    pub fn observation(
        &self,
        mode: ObservationMode,
        warning: Option<&str>,
        pdf_answer: Option<&str>,
        page_text: &str,
    ) -> String {
        let payload = match mode {
            ObservationMode::Multimodal => "screenshot",
            ObservationMode::TextOnly => "accessibility tree",
        };
        let note = match mode {
            ObservationMode::Multimodal => format!(" {}", ELEMENT_NOTE),
            ObservationMode::TextOnly => String::new(),
        };

        match pdf_answer {
            Some(answer) => format!(
                "Observation: {} Please analyze the response given by Assistant, then consider whether to continue iterating or not. The {} of the current page is also given, give the Thought and Action.{}\n{}",
                self.pdf_observation(answer),
                payload,
                note,
                page_text
            ),
            None => {
                let warning = warning.map(|w| format!(" {}", w)).unwrap_or_default();
                let verb = match mode {
                    ObservationMode::Multimodal => "the attached screenshot",
                    ObservationMode::TextOnly => "the accessibility tree",
                };
                format!(
                    "Observation:{} please analyze {} and give the Thought and Action.{}\n{}",
                    warning, verb, note, page_text
                )
            }
        }
    }

    /// Frame a PDF assistant answer so compaction can recognise it later
    pub fn pdf_observation(&self, answer: &str) -> String {
        format!(
            "{}, I ask the Assistant API to answer the task based on the PDF file and get the following response: {}",
            PDF_MARKER, answer
        )
    }

    pub fn stale_element(&self, index: usize) -> String {
        self.stale_element.replace("{index}", &index.to_string())
    }

    /// A failure turn built on the previous snapshot.
    ///
    /// Text-only turns repeat the accessibility tree, since the failure turn
    /// is then the newest turn that keeps its payload. Multimodal turns carry
    /// only the failure text and leave the last screenshot in place.
    pub fn failure_turn(&self, mode: ObservationMode, failure: &str, page_text: &str) -> String {
        match mode {
            ObservationMode::Multimodal => failure.to_string(),
            ObservationMode::TextOnly => format!(
                "{} Observation: please analyze the accessibility tree and give the Thought and Action.\n{}",
                failure, page_text
            ),
        }
    }
}
