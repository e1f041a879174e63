//! Email bodies for new orders

use crate::config::NotificationConfig;
use crate::core::entity::{ItemLabels, Order, OrderItem, PersonalizationType};
use crate::notify::mailer::EmailMessage;

/// Everything the templates need about a new order
pub struct OrderSummary<'a> {
    pub order: &'a Order,
    pub items: &'a [OrderItem],
    pub labels: &'a [ItemLabels],
    pub payment_method: &'a str,
}

/// Format an amount in lempiras, e.g. `L 1,250.00`
pub fn format_money(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{}L {}.{:02}", sign, grouped, cents % 100)
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// One-line description of an item, e.g. `Olimpia Local 2025 (Fan, talla M) x2`
fn describe_item(item: &OrderItem, labels: Option<&ItemLabels>) -> String {
    let labels = labels.cloned().unwrap_or_default();
    let mut details = Vec::new();
    if let Some(variant) = labels.variant_name {
        details.push(variant);
    }
    if let Some(size) = labels.size_label {
        details.push(format!("talla {}", size));
    }
    if let Some(patch) = labels.patch_name {
        details.push(format!("parche {}", patch));
    }
    match item.personalization_type {
        PersonalizationType::None => {}
        PersonalizationType::Player => {
            let name = item.custom_name.clone().or(labels.player_name);
            let number = item.custom_number.clone().or(labels.player_number);
            details.push(personalization_text(name, number));
        }
        PersonalizationType::Custom => {
            details.push(personalization_text(
                item.custom_name.clone(),
                item.custom_number.clone(),
            ));
        }
    }

    let name = labels
        .product_name
        .unwrap_or_else(|| "Producto".to_string());
    if details.is_empty() {
        format!("{} x{}", name, item.quantity)
    } else {
        format!("{} ({}) x{}", name, details.join(", "), item.quantity)
    }
}

fn personalization_text(name: Option<String>, number: Option<String>) -> String {
    match (name, number) {
        (Some(name), Some(number)) => format!("{} #{}", name, number),
        (Some(name), None) => name,
        (None, Some(number)) => format!("#{}", number),
        (None, None) => "personalizada".to_string(),
    }
}

fn item_lines(summary: &OrderSummary<'_>) -> Vec<(String, f64)> {
    summary
        .items
        .iter()
        .enumerate()
        .map(|(i, item)| (describe_item(item, summary.labels.get(i)), item.line_total()))
        .collect()
}

fn tracking_link(config: &NotificationConfig, order: &Order) -> Option<String> {
    config
        .tracking_url
        .as_ref()
        .map(|url| format!("{}?id={}", url, order.order_number()))
}

/// Confirmation sent to the customer
pub fn customer_confirmation(
    config: &NotificationConfig,
    summary: &OrderSummary<'_>,
) -> EmailMessage {
    let order = summary.order;
    let number = order.order_number();
    let lines = item_lines(summary);
    let tracking = tracking_link(config, order);

    let mut text = format!(
        "¡Hola {}!\n\nRecibimos tu pedido #{} en {}.\n\n",
        order.customer_first_name(),
        number,
        config.store_name
    );
    for (description, total) in &lines {
        text.push_str(&format!("- {}: {}\n", description, format_money(*total)));
    }
    text.push_str(&format!(
        "\nTotal: {}\nAnticipo para confirmar tu pedido: {}\nMétodo de pago: {}\n",
        format_money(order.total_amount),
        format_money(order.deposit_amount),
        summary.payment_method
    ));
    if let Some(link) = &tracking {
        text.push_str(&format!("\nSigue tu pedido en {}\n", link));
    }
    text.push_str(&format!("\nGracias por tu compra,\n{}\n", config.store_name));

    let rows: String = lines
        .iter()
        .map(|(description, total)| {
            format!(
                "<tr><td>{}</td><td style=\"text-align:right\">{}</td></tr>",
                escape_html(description),
                format_money(*total)
            )
        })
        .collect();
    let tracking_html = tracking
        .as_ref()
        .map(|link| {
            format!(
                "<p><a href=\"{0}\">Sigue tu pedido aquí</a></p>",
                escape_html(link)
            )
        })
        .unwrap_or_default();
    let html = format!(
        "<h1>¡Gracias por tu pedido, {name}!</h1>\
         <p>Tu número de pedido es <strong>#{number}</strong>.</p>\
         <table>{rows}</table>\
         <p>Total: <strong>{total}</strong><br>\
         Anticipo para confirmar tu pedido: <strong>{deposit}</strong><br>\
         Método de pago: {method}</p>\
         {tracking}\
         <p>{store}</p>",
        name = escape_html(order.customer_first_name()),
        number = number,
        rows = rows,
        total = format_money(order.total_amount),
        deposit = format_money(order.deposit_amount),
        method = escape_html(summary.payment_method),
        tracking = tracking_html,
        store = escape_html(&config.store_name),
    );

    EmailMessage {
        from: config.from.clone(),
        to: vec![order.customer_email.clone()],
        subject: format!("Confirmación de pedido #{} - {}", number, config.store_name),
        text,
        html,
    }
}

/// Notification sent to the shop owner; `None` without an admin address
pub fn admin_notification(
    config: &NotificationConfig,
    summary: &OrderSummary<'_>,
) -> Option<EmailMessage> {
    let admin_email = config.admin_email.clone()?;
    let order = summary.order;
    let number = order.order_number();
    let lines = item_lines(summary);

    let mut text = format!(
        "Nuevo pedido #{}\n\nCliente: {}\nCorreo: {}\nTeléfono: {}\nEnvío: {}, {}, {}\n\n",
        number,
        order.customer_name,
        order.customer_email,
        order.customer_phone,
        order.shipping_address,
        order.shipping_municipality,
        order.shipping_department
    );
    for (description, total) in &lines {
        text.push_str(&format!("- {}: {}\n", description, format_money(*total)));
    }
    text.push_str(&format!(
        "\nTotal: {}\nAnticipo: {}\nMétodo de pago: {}\nID: {}\n",
        format_money(order.total_amount),
        format_money(order.deposit_amount),
        summary.payment_method,
        order.id
    ));

    let rows: String = lines
        .iter()
        .map(|(description, total)| {
            format!(
                "<li>{} - {}</li>",
                escape_html(description),
                format_money(*total)
            )
        })
        .collect();
    let html = format!(
        "<h2>Nuevo pedido #{number}</h2>\
         <p><strong>{name}</strong><br>{email}<br>{phone}</p>\
         <p>{address}, {municipality}, {department}</p>\
         <ul>{rows}</ul>\
         <p>Total: {total}<br>Anticipo: {deposit}<br>Método de pago: {method}</p>",
        number = number,
        name = escape_html(&order.customer_name),
        email = escape_html(&order.customer_email),
        phone = escape_html(&order.customer_phone),
        address = escape_html(&order.shipping_address),
        municipality = escape_html(&order.shipping_municipality),
        department = escape_html(&order.shipping_department),
        rows = rows,
        total = format_money(order.total_amount),
        deposit = format_money(order.deposit_amount),
        method = escape_html(summary.payment_method),
    );

    Some(EmailMessage {
        from: config.from.clone(),
        to: vec![admin_email],
        subject: format!(
            "Nuevo pedido #{} - {}",
            number,
            format_money(order.total_amount)
        ),
        text,
        html,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn order() -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap(),
            customer_name: "José <Pepe> Martínez".to_string(),
            customer_email: "pepe@example.com".to_string(),
            customer_phone: "99001122".to_string(),
            shipping_department: "Comayagua".to_string(),
            shipping_municipality: "Siguatepeque".to_string(),
            shipping_address: "Barrio El Centro".to_string(),
            status: "pending_payment_50".to_string(),
            subtotal: 1700.0,
            deposit_amount: 850.0,
            total_amount: 1700.0,
            created_at: now,
            updated_at: now,
        }
    }

    fn item(order_id: Uuid) -> OrderItem {
        OrderItem {
            id: Uuid::new_v4(),
            order_id,
            product_id: Uuid::new_v4(),
            variant_id: None,
            size_id: None,
            patch_id: None,
            player_id: None,
            quantity: 2,
            unit_price: 850.0,
            personalization_type: PersonalizationType::Custom,
            custom_name: Some("PEPE".to_string()),
            custom_number: Some("10".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(0.0), "L 0.00");
        assert_eq!(format_money(850.5), "L 850.50");
        assert_eq!(format_money(1250.0), "L 1,250.00");
        assert_eq!(format_money(1234567.891), "L 1,234,567.89");
    }

    #[test]
    fn test_customer_confirmation() {
        let order = order();
        let items = vec![item(order.id)];
        let labels = vec![ItemLabels {
            product_name: Some("Olimpia Local 2025".to_string()),
            size_label: Some("M".to_string()),
            ..ItemLabels::default()
        }];
        let mut config = NotificationConfig::default();
        config.tracking_url = Some("https://tienda.example/rastreo".to_string());
        let summary = OrderSummary {
            order: &order,
            items: &items,
            labels: &labels,
            payment_method: "transfer",
        };

        let message = customer_confirmation(&config, &summary);

        assert_eq!(message.to, vec!["pepe@example.com".to_string()]);
        assert!(message.subject.contains("#A1B2C3D4"));
        assert!(message.text.contains("Olimpia Local 2025 (talla M, PEPE #10) x2"));
        assert!(message.text.contains("L 850.00"));
        assert!(message.text.contains("https://tienda.example/rastreo?id=A1B2C3D4"));
        assert!(message.html.contains("¡Gracias por tu pedido, José!"));
    }

    #[test]
    fn test_admin_notification_escapes_html() {
        let order = order();
        let mut config = NotificationConfig::default();
        config.admin_email = Some("ventas@example.com".to_string());
        let summary = OrderSummary {
            order: &order,
            items: &[],
            labels: &[],
            payment_method: "transfer",
        };

        let message = admin_notification(&config, &summary).unwrap();
        assert!(message.html.contains("&lt;Pepe&gt;"));
        assert!(message.text.contains("<Pepe>"));
    }

    #[test]
    fn test_no_admin_address_means_no_admin_email() {
        let order = order();
        let summary = OrderSummary {
            order: &order,
            items: &[],
            labels: &[],
            payment_method: "transfer",
        };
        assert!(admin_notification(&NotificationConfig::default(), &summary).is_none());
    }
}
