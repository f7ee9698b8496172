//! Deterministic fallback replies.
//!
//! Every user-visible turn must produce text even when the inference service
//! is down or returns garbage. These templates are the floor: handlers try
//! the generated `**Response:**` first and fall back here. All three session
//! languages are covered; currency rendering follows the language.

use souk_contracts::Language;

pub fn currency(language: Language) -> &'static str {
    match language {
        Language::Arabic => "د.ت",
        Language::French => "TND",
        Language::English => "$",
    }
}

pub fn greeting(language: Language) -> String {
    match language {
        Language::French => "Bonjour ! Comment puis-je vous aider aujourd'hui ?",
        Language::Arabic => "مرحبًا! كيف يمكنني مساعدتك اليوم؟",
        Language::English => "Hello! How can I assist you today?",
    }
    .to_string()
}

pub fn clarification(language: Language) -> String {
    match language {
        Language::French => {
            "Désolé, je n’ai pas compris votre demande. Pouvez-vous préciser, comme lister nos produits ou vérifier une commande ?"
        }
        Language::Arabic => "عذرًا، لم أفهم طلبك. هل يمكنك التوضيح، مثل سرد المنتجات أو التحقق من طلب؟",
        Language::English => {
            "Sorry, I didn’t understand your request. Could you clarify, like listing our products or checking an order?"
        }
    }
    .to_string()
}

pub fn no_products_available(language: Language) -> String {
    match language {
        Language::French => "Désolé, aucun produit n'est disponible pour le moment.",
        Language::Arabic => "عذرًا، لا توجد منتجات متاحة في الوقت الحالي.",
        Language::English => "Sorry, no products are available at the moment.",
    }
    .to_string()
}

/// `product_list` is pre-rendered as "name (price currency), ...".
pub fn product_list(language: Language, product_list: &str) -> String {
    match language {
        Language::French => {
            format!("Voici nos produits : {product_list}. Comment puis-je vous aider ?")
        }
        Language::Arabic => format!("هذه منتجاتنا: {product_list}. كيف يمكنني مساعدتك؟"),
        Language::English => {
            format!("Here are our products: {product_list}. How can I assist you?")
        }
    }
}

pub fn name_products(language: Language) -> String {
    match language {
        Language::French => {
            "Désolé, aucun produit n’a été spécifié. Pouvez-vous préciser le nom du produit ?"
        }
        Language::Arabic => "عذرًا، لم يتم تحديد أي منتج. هل يمكنك تحديد اسم المنتج؟",
        Language::English => "Sorry, no products were specified. Could you specify the product name?",
    }
    .to_string()
}

pub fn products_not_found(language: Language) -> String {
    match language {
        Language::French => {
            "Désolé, je n’ai pas trouvé les produits que vous souhaitez commander. Pouvez-vous préciser les noms des produits ?"
        }
        Language::Arabic => "عذرًا، لم أجد المنتجات التي تريد طلبها. هل يمكنك تحديد أسماء المنتجات؟",
        Language::English => {
            "Sorry, I couldn’t find the products you want to order. Could you specify the product names?"
        }
    }
    .to_string()
}

pub fn products_unavailable(language: Language, names: &[String]) -> String {
    let joined = names.join(", ");
    match language {
        Language::French => {
            format!("Les produits {joined} ne sont pas disponibles. Voulez-vous voir nos produits ?")
        }
        Language::Arabic => format!("المنتجات {joined} غير متوفرة. هل تريد رؤية منتجاتنا؟"),
        Language::English => {
            format!("The products {joined} are not available. Would you like to see our products?")
        }
    }
}

pub fn ask_address(language: Language, items: &[String]) -> String {
    let joined = items.join(", ");
    match language {
        Language::French => format!("Veuillez fournir votre adresse pour commander {joined}."),
        Language::Arabic => format!("يرجى تقديم عنوانك لطلب {joined}."),
        Language::English => {
            format!("Please provide your delivery address to order {joined}.")
        }
    }
}

pub fn invalid_address(language: Language, items: &[String]) -> String {
    let joined = items.join(", ");
    match language {
        Language::French => format!("Veuillez fournir une adresse valide pour commander {joined}."),
        Language::Arabic => format!("يرجى تقديم عنوان صالح لطلب {joined}."),
        Language::English => format!("Please provide a valid address to order {joined}."),
    }
}

pub fn no_items_selected(language: Language) -> String {
    match language {
        Language::French => {
            "Erreur : aucun produit sélectionné. Veuillez indiquer les produits que vous souhaitez commander."
        }
        Language::Arabic => "خطأ: لم يتم اختيار أي منتجات. يرجى تحديد المنتجات التي تريد طلبها.",
        Language::English => {
            "Error: No products selected. Please specify the products you want to order."
        }
    }
    .to_string()
}

pub fn order_confirmed(
    language: Language,
    items: &[String],
    order_id: &str,
    address: &str,
) -> String {
    let joined = items.join(", ");
    match language {
        Language::French => format!(
            "Votre commande pour {joined} a été confirmée (ID : {order_id}). Nous livrerons à {address}. Merci !"
        ),
        Language::Arabic => format!(
            "تم تأكيد طلبك لـ {joined} (المعرّف: {order_id}). سنقوم بالتوصيل إلى {address}. شكرًا لك!"
        ),
        Language::English => format!(
            "Your order for {joined} has been confirmed (ID: {order_id}). We’ll deliver to {address}. Thank you!"
        ),
    }
}

pub fn order_failed(language: Language, items: &[String]) -> String {
    let joined = items.join(", ");
    match language {
        Language::French => format!(
            "Une erreur s’est produite lors de la création de votre commande pour {joined}. Veuillez réessayer."
        ),
        Language::Arabic => {
            format!("حدث خطأ أثناء إنشاء طلبك لـ {joined}. يرجى المحاولة مرة أخرى.")
        }
        Language::English => format!(
            "An error occurred while creating your order for {joined}. Please try again."
        ),
    }
}

pub fn no_orders(language: Language) -> String {
    match language {
        Language::French => {
            "Vous n’avez aucune commande pour le moment. Voulez-vous commencer vos achats ?"
        }
        Language::Arabic => "ليس لديك أي طلبات حتى الآن. هل تريد بدء التسوق؟",
        Language::English => "You have no orders yet. Would you like to start shopping?",
    }
    .to_string()
}

/// `order_lines` is pre-rendered "- Order ID: ..., Items: ..., Status: ..." text.
pub fn orders_list(language: Language, order_lines: &str) -> String {
    match language {
        Language::French => format!("Voici vos commandes :\n{order_lines}"),
        Language::Arabic => format!("هذه طلباتك:\n{order_lines}"),
        Language::English => format!("Here are your orders:\n{order_lines}"),
    }
}

pub fn issue_need_product(language: Language) -> String {
    match language {
        Language::French => {
            "Désolé, je n’ai pas identifié de produit. Pouvez-vous préciser un produit que vous avez commandé ?"
        }
        Language::Arabic => "عذرًا، لم أتعرف على أي منتج. هل يمكنك تحديد منتج قمت بطلبه؟",
        Language::English => {
            "Sorry, I couldn’t identify a product. Could you specify a product you’ve ordered?"
        }
    }
    .to_string()
}

pub fn issue_not_ordered(language: Language, product: &str) -> String {
    match language {
        Language::French => format!(
            "Vous n’avez pas commandé de {product}. Pouvez-vous préciser un produit que vous avez acheté ?"
        ),
        Language::Arabic => format!("لم تقم بطلب {product}. هل يمكنك تحديد منتج قمت بشرائه؟"),
        Language::English => format!(
            "You haven’t ordered a {product}. Could you specify a product you’ve purchased?"
        ),
    }
}

pub fn issue_recorded(language: Language, product: &str, claim_id: &str) -> String {
    match language {
        Language::French => format!(
            "Merci d’avoir signalé un problème avec {product}. Un agent vous contactera bientôt (ID du problème : {claim_id})."
        ),
        Language::Arabic => format!(
            "شكرًا لإبلاغك عن مشكلة في {product}. سيتواصل معك أحد الوكلاء قريبًا (معرّف المشكلة: {claim_id})."
        ),
        Language::English => format!(
            "Thank you for reporting an issue with {product}. An agent will contact you soon (Issue ID: {claim_id})."
        ),
    }
}

pub fn try_again(language: Language) -> String {
    match language {
        Language::French => "Désolé, une erreur s’est produite. Veuillez réessayer.",
        Language::Arabic => "عذرًا، حدث خطأ. يرجى المحاولة مرة أخرى.",
        Language::English => "Sorry, an error occurred. Please try again.",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_tracks_language() {
        assert_eq!(currency(Language::English), "$");
        assert_eq!(currency(Language::French), "TND");
        assert_eq!(currency(Language::Arabic), "د.ت");
    }

    #[test]
    fn every_language_has_a_clarification() {
        for language in [Language::English, Language::French, Language::Arabic] {
            assert!(!clarification(language).is_empty());
            assert!(!greeting(language).is_empty());
            assert!(!try_again(language).is_empty());
        }
    }

    #[test]
    fn templates_interpolate_their_arguments() {
        let items = vec!["wall lamp".to_string(), "lunch box".to_string()];
        let confirmed = order_confirmed(Language::English, &items, "ord42", "12 Rue Ibn Khaldoun");
        assert!(confirmed.contains("wall lamp, lunch box"));
        assert!(confirmed.contains("ord42"));
        assert!(confirmed.contains("12 Rue Ibn Khaldoun"));

        let recorded = issue_recorded(Language::French, "lampe", "iss7");
        assert!(recorded.contains("lampe"));
        assert!(recorded.contains("iss7"));
    }
}
