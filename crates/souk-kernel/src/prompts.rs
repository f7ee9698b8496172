//! Prompt builders for the inference service. Every prompt pins the output
//! to a tagged format the structured parser knows how to read; the parser,
//! not the prompt, is the safety net.

use souk_contracts::Language;

pub fn language_detection(user_input: &str) -> String {
    format!(
        "Given the input: '{user_input}', perform the following task:\n\
         1. Detect the language, which must be one of: English, French, or Arabic.\n\
         Output exactly in this format, with no additional text or comments:\n\
         **Language:** detected_language"
    )
}

pub fn intent_classification(language: Language, user_input: &str) -> String {
    match language {
        Language::French => format!(
            "Vous êtes un Agent E-commerce aidant les clients avec des demandes sur les produits et les commandes. \
             Classifiez l'intention de l'entrée : '{user_input}'. \
             Intentions possibles : new_order, retrieve_order, list_products, greeting, report_issue, none. \
             Si l'utilisateur veut acheter des articles, classez comme 'new_order' et extrayez les noms des articles exactement comme fournis. \
             Pour plusieurs articles, séparez par des virgules sans 'et'. \
             Si aucun article n'est spécifié ou si l'entrée est ambiguë, définissez Items sur 'none'. \
             Ne pas utiliser 'Non-relevant' ou d'autres valeurs invalides. \
             Sortie exactement dans ce format :\n\
             **Intent:** nom_intention\n\
             **Items:** nom_article_1,nom_article_2,...,ou_none\n\
             **IssueProduct:** none\n\
             **Address:** none"
        ),
        Language::Arabic => format!(
            "أنت وكيل تجارة إلكترونية تساعد العملاء في استفسارات المنتجات والطلبات. \
             صنّف نية الإدخال: '{user_input}'. \
             النيات الممكنة: new_order, retrieve_order, list_products, greeting, report_issue, none. \
             إذا أراد المستخدم شراء عناصر، صنّف كنية 'new_order' واستخرج أسماء العناصر كما هي. \
             لعناصر متعددة، افصل بفواصل بدون 'و'. \
             إذا لم يتم تحديد عناصر أو كان الإدخال غامضًا، عيّن Items إلى 'none'. \
             الإخراج بالضبط بهذا الشكل:\n\
             **Intent:** intent_name\n\
             **Items:** item_1,item_2,...,or_none\n\
             **IssueProduct:** none\n\
             **Address:** none"
        ),
        Language::English => format!(
            "You are an E-commerce Agent assisting customers with requests about products and orders. \
             Classify the intent of the user's input: '{user_input}'. \
             Possible intents: new_order, retrieve_order, list_products, greeting, report_issue, none. \
             If the user wants to purchase items (e.g., 'I want to buy X and Y'), classify as 'new_order' \
             and extract the item names exactly as provided. \
             For multiple items, separate by commas without 'and' (e.g., 'X,Y'). \
             If no items are specified or the input is ambiguous, set Items to 'none'. \
             Do not use 'Non-relevant' or other invalid values. \
             If the user reports a problem with a product, classify as 'report_issue' and set IssueProduct to that product. \
             Output exactly in this format:\n\
             **Intent:** intent_name\n\
             **Items:** item_name_1,item_name_2,...,or_none\n\
             **IssueProduct:** product_or_none\n\
             **Address:** none"
        ),
    }
}

pub fn product_match(
    requested: &[String],
    catalog_names: &[String],
    last_error: Option<&str>,
) -> String {
    let mut prompt = format!(
        "You are an E-commerce Agent assisting customers. \
         The requested items are: {}. \
         There are exactly {} item(s) to match. \
         Available products: {}. \
         For each requested item, identify the most likely matching product from the available products. \
         Account for misspellings, shortened names, or partial matches by prioritizing string similarity. \
         Use the following rules for matching: \
         1. Prioritize products where the requested item is a substring of the product name (ignoring case). \
         2. If no substring match, select the product with the closest string similarity. \
         3. If no reasonable match is found, use 'none'. \
         Return exactly {} product name(s) in a comma-separated string, one for each requested item. \
         Do not return extra products, duplicate matches, or items not in the requested list. \
         Preserve spaces in product names and do not use underscores or other separators. \
         Output exactly in this format:\n\
         **Products:** product_name_1,product_name_2,...,product_name_n",
        requested.join(", "),
        requested.len(),
        catalog_names.join(", "),
        requested.len(),
    );
    if let Some(err) = last_error {
        prompt.push_str(&format!(
            "\nThe previous answer was rejected: {err}. Correct it, using only names from the available products."
        ));
    }
    prompt
}

/// Ask for an executable order-listing filter as a fenced JSON document.
pub fn order_filter(question: &str, last_error: Option<&str>) -> String {
    let mut prompt = format!(
        "You are an assistant that converts a customer's question about their orders into a \
         query filter. The question is: '{question}'. \
         Allowed fields: \"status\" (one of pending, processing, delivered, cancelled), \
         \"search\" (free text to match against the order), \"limit\" (1 to 50). \
         Omit any field the question does not constrain. \
         Output ONLY the filter wrapped in ```json ... ``` tags, with no explanations. \
         Example: for 'show me my pending orders', output:\n\
         ```json\n{{\"status\": \"pending\", \"limit\": 10}}\n```"
    );
    if let Some(err) = last_error {
        prompt.push_str(&format!(
            "\nThe previous filter failed with: {err}. Correct the filter to resolve this error."
        ));
    }
    prompt
}

pub fn issue_category(user_input: &str) -> String {
    format!(
        "Classify the customer complaint: '{user_input}'. \
         Possible categories: defective, wrong_item, missing_item, delivery, quality, quantity, packaging, other. \
         Output exactly in this format, with no additional text:\n\
         **Category:** category_name"
    )
}

fn reply(language: Language, instruction: &str) -> String {
    format!(
        "You are an E-commerce Agent assisting customers. {instruction} \
         Keep it short, natural, and professional in {}. \
         Output exactly in this format:\n\
         **Response:** message",
        language.as_str()
    )
}

pub fn greeting_reply(language: Language, user_input: &str) -> String {
    reply(
        language,
        &format!("The user provided a greeting: '{user_input}'. Generate a friendly greeting response."),
    )
}

pub fn clarification_reply(language: Language, user_input: &str) -> String {
    reply(
        language,
        &format!(
            "The user's input '{user_input}' was unclear. Generate a friendly clarification \
             message suggesting options like listing products or checking an order."
        ),
    )
}

pub fn product_list_reply(language: Language, product_lines: &str) -> String {
    reply(
        language,
        &format!(
            "Generate a friendly message listing the available products: {product_lines}. \
             List only product names and prices, no identifiers. \
             Do not translate or modify product names; use them exactly as provided."
        ),
    )
}

pub fn address_request_reply(language: Language, items: &[String]) -> String {
    reply(
        language,
        &format!(
            "Generate a message asking for the user's delivery address to order {}.",
            items.join(", ")
        ),
    )
}

pub fn order_confirmation_reply(
    language: Language,
    items: &[String],
    order_id: &str,
    address: &str,
) -> String {
    reply(
        language,
        &format!(
            "Generate a confirmation message for an order of {} with Order ID {order_id}. \
             Include the delivery address '{address}'.",
            items.join(", ")
        ),
    )
}

pub fn orders_list_reply(language: Language, order_lines: &str) -> String {
    reply(
        language,
        &format!("Generate a message listing the user's orders: {order_lines}."),
    )
}

pub fn no_orders_reply(language: Language) -> String {
    reply(
        language,
        "Generate a message informing the user that no orders were found and suggesting they start shopping.",
    )
}

pub fn issue_ack_reply(language: Language, product: &str, claim_id: &str) -> String {
    reply(
        language,
        &format!(
            "Generate a message thanking the user for reporting an issue with {product} and \
             informing them an agent will contact them soon. Include Issue ID: {claim_id}."
        ),
    )
}

pub fn issue_not_ordered_reply(language: Language, product: &str) -> String {
    reply(
        language,
        &format!(
            "Generate a message informing the user that they haven't ordered a {product} and \
             asking them to specify a purchased product."
        ),
    )
}

pub fn issue_need_product_reply(language: Language) -> String {
    reply(
        language,
        "Generate a message informing the user that no product was identified and asking them \
         to specify a product they've ordered (e.g., 'problem with my phone').",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_prompt_follows_session_language() {
        let fr = intent_classification(Language::French, "bonsoir");
        assert!(fr.contains("bonsoir"));
        assert!(fr.contains("**Intent:**"));
        let en = intent_classification(Language::English, "hello");
        assert!(en.contains("new_order, retrieve_order, list_products"));
    }

    #[test]
    fn product_match_feeds_back_rejection() {
        let requested = vec!["lamp".to_string()];
        let names = vec!["solar interaction wall lamp".to_string()];
        let first = product_match(&requested, &names, None);
        assert!(!first.contains("rejected"));
        let retry = product_match(&requested, &names, Some("2 names expected, got 1"));
        assert!(retry.contains("2 names expected, got 1"));
    }

    #[test]
    fn order_filter_prompt_is_fenced_json() {
        let prompt = order_filter("show my pending orders", None);
        assert!(prompt.contains("```json"));
    }

    #[test]
    fn reply_prompts_pin_the_response_tag() {
        for prompt in [
            greeting_reply(Language::English, "hi"),
            clarification_reply(Language::Arabic, "???"),
            no_orders_reply(Language::French),
        ] {
            assert!(prompt.contains("**Response:**"));
        }
    }
}
