use super::RagError;
use crate::pipeline::ingest::types::Passage;

const CONTEXT_SLOT: &str = "{context}";
const INPUT_SLOT: &str = "{input}";

pub const ENGLISH_TEMPLATE: &str = "
You are a helpful and respectful AI assistant for public health queries in Odisha, India.
Your answers should be based only on the context provided below.
If the context does not contain the answer, state clearly that you do not have enough information.
Provide answers that are concise, easy to understand, and in ENGLISH.

Context:
{context}

Question:
{input}

Answer in English:
";

pub const ODIA_TEMPLATE: &str = "
ଆପଣ ଓଡ଼ିଶା, ଭାରତରେ ଜନସ୍ୱାସ୍ଥ୍ୟ ସମ୍ବନ୍ଧୀୟ ପ୍ରଶ୍ନ ପାଇଁ ଜଣେ ସାହାଯ୍ୟକାରୀ AI ଆସିଷ୍ଟାଣ୍ଟ ଅଟନ୍ତି।
ଆପଣଙ୍କର ଉତ୍ତର କେବଳ ନିମ୍ନରେ ଦିଆଯାଇଥିବା ପ୍ରସଙ୍ଗ ଉପରେ ଆଧାରିତ ହେବା ଉଚିତ୍।
ଯଦି ପ୍ରସଙ୍ଗରେ ଉତ୍ତର ନାହିଁ, ତେବେ ସ୍ପଷ୍ଟ ଭାବରେ କୁହନ୍ତୁ ଯେ ଆପଣଙ୍କ ପାଖରେ ଯଥେଷ୍ଟ ସୂଚନା ନାହିଁ।
ଉତ୍ତର ସଂକ୍ଷିପ୍ତ, ସହଜରେ ବୁଝିହେବା ଭଳି ଏବଂ ଓଡ଼ିଆରେ ଦିଅନ୍ତୁ।

ପ୍ରସଙ୍ଗ:
{context}

ପ୍ରଶ୍ନ:
{input}

ଓଡ଼ିଆରେ ଉତ୍ତର:
";

pub const HINDI_TEMPLATE: &str = "
आप ओडिशा, भारत में सार्वजनिक स्वास्थ्य संबंधी प्रश्नों के लिए एक सहायक एआई असिस्टेंट हैं।
आपके उत्तर केवल नीचे दिए गए संदर्भ पर आधारित होने चाहिए।
यदि संदर्भ में उत्तर नहीं है, तो स्पष्ट रूप से बताएं कि आपके पास पर्याप्त जानकारी नहीं है।
संक्षिप्त, समझने में आसान और हिंदी में उत्तर प्रदान करें।

संदर्भ:
{context}

प्रश्न:
{input}

हिंदी में उत्तर:
";

/// Response languages with a registered prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locale {
    English,
    Odia,
    Hindi,
}

impl Locale {
    pub const ALL: [Locale; 3] = [Locale::English, Locale::Odia, Locale::Hindi];

    pub fn code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Odia => "or",
            Self::Hindi => "hi",
        }
    }

    /// Map a language code to a registered locale. Anything else is English.
    pub fn resolve(code: &str) -> Self {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|l| l.code().eq_ignore_ascii_case(code))
            .unwrap_or(Self::English)
    }

    pub fn template(&self) -> &'static str {
        match self {
            Self::English => ENGLISH_TEMPLATE,
            Self::Odia => ODIA_TEMPLATE,
            Self::Hindi => HINDI_TEMPLATE,
        }
    }

    /// Fixed reply used when retrieval finds nothing to ground an answer on.
    pub fn no_information_reply(&self) -> &'static str {
        match self {
            Self::English => {
                "I'm sorry, I do not have enough information about that in my health records yet."
            }
            Self::Odia => "ଦୁଃଖିତ, ମୋ ପାଖରେ ଏହି ବିଷୟରେ ଯଥେଷ୍ଟ ସୂଚନା ନାହିଁ।",
            Self::Hindi => "क्षमा करें, मेरे पास इस विषय में पर्याप्त जानकारी नहीं है।",
        }
    }
}

/// Check that every template has exactly one context slot followed by exactly one input slot.
pub fn validate_templates() -> Result<(), RagError> {
    Locale::ALL.iter().try_for_each(|locale| validate_template(locale.code(), locale.template()))
}

fn validate_template(locale: &'static str, template: &str) -> Result<(), RagError> {
    let invalid = |reason: String| RagError::Template { locale, reason };

    for slot in [CONTEXT_SLOT, INPUT_SLOT] {
        let count = template.matches(slot).count();
        if count != 1 {
            return Err(invalid(format!("expected one {slot} slot, found {count}")));
        }
    }

    match (template.find(CONTEXT_SLOT), template.find(INPUT_SLOT)) {
        (Some(context), Some(input)) if context < input => Ok(()),
        _ => Err(invalid(format!("{CONTEXT_SLOT} must come before {INPUT_SLOT}"))),
    }
}

/// Join passage bodies with a blank line between them.
pub fn join_passages(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| p.body.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fill the locale's template with the retrieved passages and the question.
///
/// Substitution is a single pass over the template, so slot markers that
/// appear inside passages or the question are left as literal text.
pub fn compose_prompt(locale: Locale, passages: &[Passage], question: &str) -> String {
    let template = locale.template();
    let context = join_passages(passages);

    let mut prompt = String::with_capacity(template.len() + context.len() + question.len());
    let mut rest = template;
    while let Some(pos) = rest.find('{') {
        prompt.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix(CONTEXT_SLOT) {
            prompt.push_str(&context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix(INPUT_SLOT) {
            prompt.push_str(question);
            rest = after;
        } else {
            prompt.push('{');
            rest = &tail[1..];
        }
    }
    prompt.push_str(rest);
    prompt
}
